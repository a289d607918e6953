//! Classified errors for Confluence requests.
//!
//! Per-page failures are reported, not propagated: the ingest loop logs the
//! error together with [`FetchError::hint`] and moves on to the next page.

use thiserror::Error;

/// Failure talking to the HTTP client itself (no response received).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS, proxy or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// The external client could not be started or produced unusable output.
    #[error("transport failure: {0}")]
    Client(String),
}

/// Errors fetching a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP 401 Unauthorized for {url}")]
    Unauthorized { url: String },

    #[error("HTTP 403 Forbidden for {url}")]
    Forbidden { url: String },

    #[error("HTTP 404 Not Found for {url}")]
    NotFound { url: String },

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response body from {url}: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    /// Map a non-success status code to its error variant.
    pub fn from_status(status: u16, url: &str) -> Self {
        let url = url.to_string();
        match status {
            401 => FetchError::Unauthorized { url },
            403 => FetchError::Forbidden { url },
            404 => FetchError::NotFound { url },
            _ => FetchError::Status { status, url },
        }
    }

    /// Remediation advice shown next to the error in logs.
    pub fn hint(&self) -> &'static str {
        match self {
            FetchError::Unauthorized { .. } => {
                "check CONFLUENCE_EMAIL / CONFLUENCE_API_TOKEN (Cloud) or CONFLUENCE_BEARER_TOKEN (Data Center PAT)"
            }
            FetchError::Forbidden { .. } => {
                "the credentials are valid but lack view permission on this page or its space"
            }
            FetchError::NotFound { .. } => {
                "the page id does not exist or is restricted; verify it in the page URL (pageId=...)"
            }
            FetchError::Status { .. } => "unexpected HTTP status; retry later or check the base URL",
            FetchError::Transport(TransportError::Network(_)) => {
                "network request failed; if a proxy blocks the client, set confluence.transport = \"curl\""
            }
            FetchError::Transport(TransportError::Client(_)) => {
                "the HTTP client could not run; check confluence.curl_path"
            }
            FetchError::Decode { .. } => {
                "the response was not Confluence REST JSON; check that base_url points at the wiki root"
            }
        }
    }

    /// True for 401/403.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            FetchError::Unauthorized { .. } | FetchError::Forbidden { .. }
        )
    }
}
