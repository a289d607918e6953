//! Core data models used throughout the ingestion pipeline.
//!
//! Pages come off the wire as [`RawPage`], get normalized into [`Page`],
//! and leave as a list of [`Chunk`]s headed for a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version header for a page, enough to decide whether to fetch the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVersion {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A page as fetched from Confluence, body still in storage format.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub storage_html: String,
}

/// A normalized page ready for chunking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub page_id: String,
    pub title: String,
    pub version: u64,
    pub url: String,
    pub chunk_index: usize,
}

/// A fixed-size, overlapping slice of a page's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub page_content: String,
    pub metadata: ChunkMetadata,
    /// SHA-256 of `page_content`, hex encoded.
    pub hash: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Page ids that were fetched, chunked, and written this run.
    pub updated: Vec<String>,
    /// Page ids whose remote version was not newer than the manifest.
    pub skipped: Vec<String>,
    /// Page ids that failed, with the error message.
    pub failed: Vec<(String, String)>,
    pub chunks_written: u64,
}
