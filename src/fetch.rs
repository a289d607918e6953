//! Confluence REST client.
//!
//! Talks to the v1 content API:
//!
//! | Call | Request |
//! |------|---------|
//! | [`ConfluenceClient::page_version`] | `GET {base}/rest/api/content/{id}?expand=version` |
//! | [`ConfluenceClient::fetch_page`] | `GET {base}/rest/api/content/{id}?expand=body.storage,version` |
//! | [`ConfluenceClient::list_space_pages`] | `GET {base}/rest/api/content?spaceKey=K&type=page&limit=N&start=S` |
//!
//! # Environment Variables
//!
//! Credentials in the config file can be overridden from the environment:
//! - `CONFLUENCE_EMAIL` + `CONFLUENCE_API_TOKEN`: Basic auth (Cloud)
//! - `CONFLUENCE_BEARER_TOKEN`: personal access token (Data Center); wins over Basic

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ConfluenceConfig;
use crate::error::{FetchError, TransportError};
use crate::models::{PageVersion, RawPage};
use crate::transport::HttpTransport;

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Basic { email: String, api_token: String },
    Bearer { token: String },
    Anonymous,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Basic { email, .. } => write!(f, "Basic({}, ***)", email),
            Auth::Bearer { .. } => write!(f, "Bearer(***)"),
            Auth::Anonymous => write!(f, "Anonymous"),
        }
    }
}

impl Auth {
    /// Resolve credentials from config, with process environment overrides.
    pub fn from_config(config: &ConfluenceConfig) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve credentials using `env` for lookups. Empty values count as unset.
    pub fn resolve(config: &ConfluenceConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, fallback: &Option<String>| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| fallback.clone().filter(|v| !v.trim().is_empty()))
        };

        if let Some(token) = pick("CONFLUENCE_BEARER_TOKEN", &config.bearer_token) {
            return Auth::Bearer { token };
        }

        match (
            pick("CONFLUENCE_EMAIL", &config.email),
            pick("CONFLUENCE_API_TOKEN", &config.api_token),
        ) {
            (Some(email), Some(api_token)) => Auth::Basic { email, api_token },
            _ => Auth::Anonymous,
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Auth::Basic { email, api_token } => {
                let raw = format!("{}:{}", email, api_token);
                Some(format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(raw)
                ))
            }
            Auth::Bearer { token } => Some(format!("Bearer {}", token)),
            Auth::Anonymous => None,
        }
    }
}

/// A source of Confluence pages for the ingest pipeline.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch only the version header of a page.
    async fn page_version(&self, page_id: &str) -> Result<PageVersion, FetchError>;

    /// Fetch a page including its storage-format body.
    async fn fetch_page(&self, page_id: &str) -> Result<RawPage, FetchError>;

    /// List the ids of every page in a space.
    async fn list_space_pages(&self, space_key: &str) -> Result<Vec<String>, FetchError>;
}

// Wire shapes of the content API, trimmed to what we read.

#[derive(Debug, Deserialize)]
struct ContentJson {
    id: String,
    #[serde(default)]
    title: String,
    version: VersionJson,
    #[serde(default)]
    body: Option<BodyJson>,
}

#[derive(Debug, Deserialize)]
struct VersionJson {
    number: u64,
    #[serde(default)]
    when: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct BodyJson {
    storage: StorageJson,
}

#[derive(Debug, Deserialize)]
struct StorageJson {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ContentListJson {
    results: Vec<ContentRefJson>,
    #[serde(default, rename = "_links")]
    links: Option<LinksJson>,
}

#[derive(Debug, Deserialize)]
struct ContentRefJson {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LinksJson {
    #[serde(default)]
    next: Option<String>,
}

/// Confluence client over any [`HttpTransport`].
pub struct ConfluenceClient {
    base_url: String,
    auth: Auth,
    transport: Box<dyn HttpTransport>,
    page_limit: usize,
}

impl ConfluenceClient {
    /// `base_url` must already be sanitized.
    pub fn new(base_url: impl Into<String>, auth: Auth, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            transport,
            page_limit: 50,
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn content_url(&self, page_id: &str, expand: &str) -> String {
        format!(
            "{}/rest/api/content/{}?expand={}",
            self.base_url, page_id, expand
        )
    }

    fn space_url(&self, space_key: &str, start: usize) -> Result<String, FetchError> {
        let limit = self.page_limit.to_string();
        let start = start.to_string();
        reqwest::Url::parse_with_params(
            &format!("{}/rest/api/content", self.base_url),
            [
                ("spaceKey", space_key),
                ("type", "page"),
                ("limit", limit.as_str()),
                ("start", start.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| {
            TransportError::Client(format!("invalid URL for space {}: {}", space_key, e)).into()
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(value) = self.auth.header_value() {
            headers.push(("Authorization".to_string(), value));
        }

        debug!(url, transport = self.transport.name(), "GET");
        let response = self.transport.get(url, &headers).await?;
        if !response.is_success() {
            return Err(FetchError::from_status(response.status, url));
        }

        serde_json::from_str(&response.body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PageSource for ConfluenceClient {
    async fn page_version(&self, page_id: &str) -> Result<PageVersion, FetchError> {
        let url = self.content_url(page_id, "version");
        let content: ContentJson = self.get_json(&url).await?;
        Ok(PageVersion {
            id: content.id,
            title: content.title,
            version: content.version.number,
            updated_at: content.version.when,
        })
    }

    async fn fetch_page(&self, page_id: &str) -> Result<RawPage, FetchError> {
        let url = self.content_url(page_id, "body.storage,version");
        let content: ContentJson = self.get_json(&url).await?;
        let storage_html = content
            .body
            .map(|b| b.storage.value)
            .ok_or_else(|| FetchError::Decode {
                url: url.clone(),
                message: "missing body.storage".to_string(),
            })?;

        Ok(RawPage {
            id: content.id,
            title: content.title,
            version: content.version.number,
            updated_at: content.version.when,
            storage_html,
        })
    }

    async fn list_space_pages(&self, space_key: &str) -> Result<Vec<String>, FetchError> {
        let mut ids = Vec::new();
        let mut start = 0usize;

        loop {
            let url = self.space_url(space_key, start)?;
            let page: ContentListJson = self.get_json(&url).await?;
            let count = page.results.len();
            ids.extend(page.results.into_iter().map(|r| r.id));

            let has_next = page.links.and_then(|l| l.next).is_some();
            if count == 0 || !has_next {
                break;
            }
            start += count;
        }

        debug!(space_key, pages = ids.len(), "listed space");
        Ok(ids)
    }
}
