//! TOML configuration parsing and validation.
//!
//! ```toml
//! [confluence]
//! base_url = "https://acme.atlassian.net/wiki"
//! page_ids = ["123456", "987654"]
//! space_keys = ["QA"]
//! email = "qa-bot@acme.com"
//! # api_token / bearer_token usually come from the environment
//! transport = "auto"
//!
//! [chunking]
//! chunk_size = 3000
//! overlap = 300
//! max_chars = 200000
//!
//! [manifest]
//! path = "./data/manifest.json"
//!
//! [store]
//! kind = "sqlite"
//! path = "./data/cfi.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sanitize::sanitize_base_url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub confluence: ConfluenceConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceConfig {
    pub base_url: String,
    #[serde(default)]
    pub page_ids: Vec<String>,
    #[serde(default)]
    pub space_keys: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default)]
    pub transport: TransportMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_curl_path")]
    pub curl_path: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

/// Which HTTP client carries Confluence requests.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Reqwest,
    Curl,
    /// reqwest first, `curl` once reqwest fails at the network level.
    #[default]
    Auto,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_curl_path() -> String {
    "curl".to_string()
}
fn default_page_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_chunk_size() -> usize {
    3000
}
fn default_overlap() -> usize {
    300
}
fn default_max_chars() -> usize {
    200_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ManifestConfig {
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("./data/manifest.json")
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Json,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Output directory for the JSON store, database file for SQLite.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/pages")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text. The base URL is sanitized in place.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.confluence.base_url = sanitize_base_url(&config.confluence.base_url);
    if config.confluence.base_url.is_empty() {
        anyhow::bail!("confluence.base_url must not be empty");
    }
    if !config.confluence.base_url.starts_with("http://")
        && !config.confluence.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "confluence.base_url must start with http:// or https:// (got '{}')",
            config.confluence.base_url
        );
    }
    if config.confluence.page_limit == 0 {
        anyhow::bail!("confluence.page_limit must be > 0");
    }

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse_config(
            r#"
            [confluence]
            base_url = "https://acme.atlassian.net/wiki/home/"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.confluence.base_url, "https://acme.atlassian.net/wiki");
        assert_eq!(cfg.confluence.transport, TransportMode::Auto);
        assert_eq!(cfg.chunking.chunk_size, 3000);
        assert_eq!(cfg.chunking.overlap, 300);
        assert_eq!(cfg.store.kind, StoreKind::Json);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = parse_config(
            r#"
            [confluence]
            base_url = "https://acme.atlassian.net/wiki"
            [chunking]
            chunk_size = 100
            overlap = 100
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = parse_config(
            r#"
            [confluence]
            base_url = "acme.atlassian.net/wiki"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn parses_transport_and_store() {
        let cfg = parse_config(
            r#"
            [confluence]
            base_url = "https://acme.atlassian.net/wiki"
            transport = "curl"
            page_ids = ["1", "2"]
            [store]
            kind = "sqlite"
            path = "/tmp/x.sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.confluence.transport, TransportMode::Curl);
        assert_eq!(cfg.confluence.page_ids, vec!["1", "2"]);
        assert_eq!(cfg.store.kind, StoreKind::Sqlite);
    }
}
