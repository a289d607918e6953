//! # confluence-ingest
//!
//! Incremental Confluence ingestion for retrieval pipelines.
//!
//! Pages are fetched over the Confluence REST API, their storage-format
//! HTML is flattened to text, and the text is cut into overlapping
//! fixed-size chunks tagged with page metadata. A version manifest makes
//! re-runs idempotent: a page is only re-fetched when its version number
//! moves.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐
//! │  Manifest   │──▶│  Fetcher  │──▶│ Normalize │──▶│ Chunker │──▶│  Store  │
//! │ version gate│   │reqwest/curl│  │ HTML→text │   │ windows │   │JSON/SQL │
//! └─────────────┘   └───────────┘   └───────────┘   └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cfi init                      # create the store
//! cfi check                     # verify URL, credentials and transport
//! cfi sync                      # ingest changed pages
//! cfi sync --dry-run            # show what would change
//! cfi search "release checklist"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`sanitize`] | Base URL normalization |
//! | [`transport`] | reqwest / curl HTTP transports |
//! | [`fetch`] | Confluence REST client and auth |
//! | [`normalize`] | Storage-format HTML to text |
//! | [`manifest`] | Version manifest |
//! | [`chunk`] | Overlapping fixed-size chunker |
//! | [`store`] | JSON and SQLite chunk stores |
//! | [`ingest`] | Pipeline orchestration |
//! | [`search`] | FTS5 keyword search |

pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod get;
pub mod ingest;
pub mod manifest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod sanitize;
pub mod search;
pub mod store;
pub mod transport;
