//! Version manifest for incremental sync.
//!
//! A JSON object keyed by page id:
//!
//! ```json
//! {
//!   "123456": { "version": 14, "title": "Release Checklist", "updatedAt": "2024-05-01T12:00:00Z" }
//! }
//! ```
//!
//! A page is re-fetched only when its remote version number is greater than
//! the one recorded here, so re-running a sync with no upstream edits writes
//! nothing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub version: u64,
    pub title: String,
    /// When this entry was last written locally.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Load from disk. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read manifest: {}", path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// Write pretty JSON via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create manifest directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write manifest: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace manifest: {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, page_id: &str) -> Option<&ManifestEntry> {
        self.entries.get(page_id)
    }

    /// True when the page is unknown or `remote_version` is newer.
    pub fn needs_update(&self, page_id: &str, remote_version: u64) -> bool {
        match self.entries.get(page_id) {
            Some(entry) => remote_version > entry.version,
            None => true,
        }
    }

    pub fn record(&mut self, page_id: &str, version: u64, title: &str) {
        self.entries.insert(
            page_id.to_string(),
            ManifestEntry {
                version,
                title: title.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// CLI entry point for `cfi status`.
pub fn run_status(path: &Path) -> Result<()> {
    let manifest = Manifest::load(path)?;
    if manifest.is_empty() {
        println!("No pages recorded in {}", path.display());
        return Ok(());
    }

    println!("{:<14} {:>8}  {:<20}  TITLE", "PAGE", "VERSION", "SYNCED");
    for (id, entry) in manifest.iter() {
        println!(
            "{:<14} {:>8}  {:<20}  {}",
            id,
            entry.version,
            entry.updated_at.format("%Y-%m-%dT%H:%M:%SZ"),
            entry.title
        );
    }
    println!("{} pages", manifest.len());
    Ok(())
}
