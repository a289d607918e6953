//! Ingestion pipeline orchestration.
//!
//! Coordinates the full sync flow: version check → fetch → normalization →
//! chunking → storage. The manifest gates every page, so unchanged pages
//! cost one lightweight version request and nothing else.
//!
//! Fetch failures (network, 401/403, 404, bad JSON) are per-page: they are
//! logged with a remediation hint and the batch carries on. Store failures
//! abort the run, since they mean local I/O is broken for every page.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::chunk::chunk_page;
use crate::config::{ChunkingConfig, Config};
use crate::error::FetchError;
use crate::fetch::{Auth, ConfluenceClient, PageSource};
use crate::manifest::Manifest;
use crate::models::{Chunk, IngestReport, Page};
use crate::normalize::html_to_text;
use crate::progress::{ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::sanitize::page_url;
use crate::store::{open_store, ChunkStore, StoredPage};
use crate::transport::build_transport;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Ignore the manifest and reprocess every page.
    pub full: bool,
    /// Fetch and chunk, but write neither store nor manifest.
    pub dry_run: bool,
}

/// Run the pipeline over `page_ids` in order.
///
/// In dry-run mode `chunks_written` counts the chunks that would have been
/// written.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_pages(
    source: &dyn PageSource,
    store: &dyn ChunkStore,
    manifest: &mut Manifest,
    page_ids: &[String],
    base_url: &str,
    chunking: &ChunkingConfig,
    opts: IngestOptions,
    progress: &dyn SyncProgressReporter,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    let total = page_ids.len() as u64;

    for (i, page_id) in page_ids.iter().enumerate() {
        match ingest_one(source, store, manifest, page_id, base_url, chunking, opts).await {
            Ok(PageOutcome::Updated { chunks }) => {
                report.updated.push(page_id.clone());
                report.chunks_written += chunks as u64;
            }
            Ok(PageOutcome::Unchanged) => report.skipped.push(page_id.clone()),
            Err(PageError::Fetch(e)) => {
                error!(
                    page_id = %page_id,
                    error = %e,
                    auth = e.is_auth(),
                    hint = e.hint(),
                    "failed to fetch page"
                );
                report.failed.push((page_id.clone(), e.to_string()));
            }
            Err(PageError::Store(e)) => {
                return Err(e.context(format!("store write failed for page {}", page_id)));
            }
        }

        progress.report(SyncProgressEvent::Ingesting {
            page_id: page_id.clone(),
            n: i as u64 + 1,
            total,
        });
    }

    info!(
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        chunks = report.chunks_written,
        dry_run = opts.dry_run,
        "ingest finished"
    );
    Ok(report)
}

enum PageOutcome {
    Updated { chunks: usize },
    Unchanged,
}

enum PageError {
    Fetch(FetchError),
    Store(anyhow::Error),
}

impl From<FetchError> for PageError {
    fn from(e: FetchError) -> Self {
        PageError::Fetch(e)
    }
}

async fn ingest_one(
    source: &dyn PageSource,
    store: &dyn ChunkStore,
    manifest: &mut Manifest,
    page_id: &str,
    base_url: &str,
    chunking: &ChunkingConfig,
    opts: IngestOptions,
) -> Result<PageOutcome, PageError> {
    let remote = source.page_version(page_id).await?;
    if !opts.full && !manifest.needs_update(page_id, remote.version) {
        debug!(page_id, version = remote.version, "unchanged, skipping");
        return Ok(PageOutcome::Unchanged);
    }

    let raw = source.fetch_page(page_id).await?;
    let page = Page {
        id: raw.id,
        title: raw.title,
        version: raw.version,
        text: html_to_text(&raw.storage_html),
    };
    let chunks = chunk_page(&page, base_url, chunking);
    if chunks.is_empty() {
        warn!(page_id, title = %page.title, "page has no text content");
    }

    if opts.dry_run {
        info!(page_id, version = page.version, chunks = chunks.len(), "would update");
        return Ok(PageOutcome::Updated {
            chunks: chunks.len(),
        });
    }

    store
        .upsert_page(&page, &page_url(base_url, page_id), &chunks)
        .await
        .map_err(PageError::Store)?;
    manifest.record(page_id, page.version, &page.title);
    info!(
        page_id,
        title = %page.title,
        version = page.version,
        chunks = chunks.len(),
        "page updated"
    );

    Ok(PageOutcome::Updated {
        chunks: chunks.len(),
    })
}

/// Expand configured page ids and spaces into one ordered, deduplicated list.
///
/// A space that cannot be listed is logged and skipped like a failed page.
pub async fn resolve_page_ids(
    source: &dyn PageSource,
    page_ids: &[String],
    space_keys: &[String],
    progress: &dyn SyncProgressReporter,
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for id in page_ids {
        if seen.insert(id.clone()) {
            ids.push(id.clone());
        }
    }

    for space in space_keys {
        progress.report(SyncProgressEvent::Discovering {
            space: space.clone(),
        });
        match source.list_space_pages(space).await {
            Ok(space_ids) => {
                for id in space_ids {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
            }
            Err(e) => {
                error!(space = %space, error = %e, hint = e.hint(), "failed to list space");
            }
        }
    }

    ids
}

/// Arguments for `cfi sync`.
#[derive(Debug, Clone, Default)]
pub struct SyncArgs {
    pub full: bool,
    pub dry_run: bool,
    /// Explicit page ids; when non-empty, configured pages and spaces are ignored.
    pub pages: Vec<String>,
    pub limit: Option<usize>,
}

/// CLI entry point for `cfi sync`.
pub async fn run_sync(config: &Config, args: SyncArgs, progress: ProgressMode) -> Result<()> {
    let confluence = &config.confluence;
    let auth = Auth::from_config(confluence);
    if auth == Auth::Anonymous {
        warn!("no Confluence credentials configured, requesting anonymously");
    }

    let transport = build_transport(confluence)?;
    let client = ConfluenceClient::new(confluence.base_url.clone(), auth, transport)
        .with_page_limit(confluence.page_limit);
    let reporter = progress.reporter();

    let mut page_ids = if args.pages.is_empty() {
        resolve_page_ids(
            &client,
            &confluence.page_ids,
            &confluence.space_keys,
            reporter.as_ref(),
        )
        .await
    } else {
        args.pages.clone()
    };
    if let Some(limit) = args.limit {
        page_ids.truncate(limit);
    }
    if page_ids.is_empty() {
        anyhow::bail!(
            "No pages to sync. Set confluence.page_ids or confluence.space_keys, or pass --page."
        );
    }

    let mut manifest = Manifest::load(&config.manifest.path)?;
    let store: Box<dyn ChunkStore> = if args.dry_run {
        Box::new(DiscardStore)
    } else {
        open_store(&config.store).await?
    };
    let opts = IngestOptions {
        full: args.full,
        dry_run: args.dry_run,
    };

    let result = ingest_pages(
        &client,
        store.as_ref(),
        &mut manifest,
        &page_ids,
        &confluence.base_url,
        &config.chunking,
        opts,
        reporter.as_ref(),
    )
    .await;

    // Keep progress made before a store failure.
    if manifest_needs_save(&result, args.dry_run) {
        manifest
            .save(&config.manifest.path)
            .context("Failed to save manifest")?;
    }
    let report = result?;

    if args.dry_run {
        println!("sync confluence (dry-run)");
        println!("  pages checked: {}", page_ids.len());
        println!("  would update: {}", report.updated.len());
        println!("  unchanged: {}", report.skipped.len());
        println!("  failed: {}", report.failed.len());
        println!("  estimated chunks: {}", report.chunks_written);
        return Ok(());
    }

    println!("sync confluence");
    println!("  pages checked: {}", page_ids.len());
    println!("  updated: {}", report.updated.len());
    println!("  unchanged: {}", report.skipped.len());
    println!("  failed: {}", report.failed.len());
    println!("  chunks written: {}", report.chunks_written);
    println!("  store: {} ({})", store.kind(), config.store.path.display());
    for (id, message) in &report.failed {
        println!("  ! {}: {}", id, message);
    }
    println!("ok");

    Ok(())
}

/// True when the run recorded something: a page was updated, or a store
/// failure cut the run short after earlier pages were recorded.
fn manifest_needs_save(result: &Result<IngestReport>, dry_run: bool) -> bool {
    if dry_run {
        return false;
    }
    match result {
        Ok(report) => !report.updated.is_empty(),
        Err(_) => true,
    }
}

/// Stand-in store for dry runs, so `--dry-run` never creates the real one.
struct DiscardStore;

#[async_trait]
impl ChunkStore for DiscardStore {
    fn kind(&self) -> &str {
        "discard"
    }

    async fn upsert_page(&self, _page: &Page, _url: &str, _chunks: &[Chunk]) -> Result<()> {
        Ok(())
    }

    async fn get_page(&self, _page_id: &str) -> Result<Option<StoredPage>> {
        Ok(None)
    }
}

/// CLI entry point for `cfi check`: one version request per configured page.
pub async fn run_check(config: &Config) -> Result<()> {
    let confluence = &config.confluence;
    let auth = Auth::from_config(confluence);
    let transport = build_transport(confluence)?;
    let transport_name = transport.name().to_string();
    let client = ConfluenceClient::new(confluence.base_url.clone(), auth.clone(), transport);

    println!("base_url:   {}", client.base_url());
    println!("auth:       {:?}", auth);
    println!("transport:  {}", transport_name);

    let Some(page_id) = confluence.page_ids.first() else {
        println!("no page_ids configured; nothing to probe");
        return Ok(());
    };

    match client.page_version(page_id).await {
        Ok(v) => {
            println!(
                "page {}:  OK  (\"{}\", version {})",
                page_id, v.title, v.version
            );
            Ok(())
        }
        Err(e) => {
            println!("page {}:  FAILED  {}", page_id, e);
            println!("hint:       {}", e.hint());
            anyhow::bail!("connection check failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(updated: &[&str], skipped: &[&str]) -> IngestReport {
        IngestReport {
            updated: updated.iter().map(|s| s.to_string()).collect(),
            skipped: skipped.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn manifest_saved_only_when_something_changed() {
        assert!(!manifest_needs_save(&Ok(report(&[], &["1", "2"])), false));
        assert!(manifest_needs_save(&Ok(report(&["1"], &["2"])), false));
        assert!(manifest_needs_save(&Err(anyhow::anyhow!("disk full")), false));
    }

    #[test]
    fn dry_run_never_saves_manifest() {
        assert!(!manifest_needs_save(&Ok(report(&["1"], &[])), true));
        assert!(!manifest_needs_save(&Err(anyhow::anyhow!("disk full")), true));
    }

    #[tokio::test]
    async fn discard_store_keeps_nothing() {
        let page = Page {
            id: "1".into(),
            title: "T".into(),
            version: 1,
            text: "body".into(),
        };
        DiscardStore.upsert_page(&page, "u", &[]).await.unwrap();
        assert!(DiscardStore.get_page("1").await.unwrap().is_none());
    }
}
