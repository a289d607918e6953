//! # confluence-ingest CLI (`cfi`)
//!
//! ## Usage
//!
//! ```bash
//! cfi --config ./config/cfi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cfi init` | Create the configured store |
//! | `cfi check` | Verify base URL, credentials and transport against one page |
//! | `cfi sync` | Ingest pages whose version changed |
//! | `cfi status` | List pages recorded in the manifest |
//! | `cfi search "<query>"` | Keyword search (SQLite store) |
//! | `cfi get <page-id>` | Print a stored page and its chunks |
//! | `cfi sanitize <url>` | Show how a base URL will be normalized |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use confluence_ingest::config;
use confluence_ingest::get;
use confluence_ingest::ingest::{self, SyncArgs};
use confluence_ingest::manifest;
use confluence_ingest::progress::ProgressMode;
use confluence_ingest::sanitize::sanitize_base_url;
use confluence_ingest::search;
use confluence_ingest::store;

/// Incremental Confluence ingestion: fetch, normalize, chunk, store.
#[derive(Parser)]
#[command(
    name = "cfi",
    about = "Incremental Confluence ingestion and chunking for retrieval pipelines",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cfi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured store (directory or SQLite schema).
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Probe the first configured page to verify URL, auth and transport.
    Check,

    /// Ingest pages whose remote version is newer than the manifest.
    Sync {
        /// Ignore the manifest and reprocess every page.
        #[arg(long)]
        full: bool,

        /// Fetch and chunk without writing the store or manifest.
        #[arg(long)]
        dry_run: bool,

        /// Sync only this page id (repeatable). Overrides configured pages and spaces.
        #[arg(long = "page")]
        pages: Vec<String>,

        /// Maximum number of pages to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to human when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List pages recorded in the manifest.
    Status,

    /// Search stored chunks by keyword (requires the SQLite store).
    Search {
        query: String,

        /// Maximum number of pages to return.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Print a stored page and its chunks.
    Get {
        page_id: String,

        /// Print only the chunks.
        #[arg(long)]
        chunks_only: bool,
    },

    /// Print the normalized form of a Confluence base URL.
    Sanitize { url: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    if let Commands::Sanitize { url } = &cli.command {
        println!("{}", sanitize_base_url(url));
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = store::open_store(&cfg.store).await?;
            println!(
                "Store initialized: {} ({})",
                store.kind(),
                cfg.store.path.display()
            );
        }
        Commands::Check => {
            ingest::run_check(&cfg).await?;
        }
        Commands::Sync {
            full,
            dry_run,
            pages,
            limit,
            progress,
        } => {
            let args = SyncArgs {
                full,
                dry_run,
                pages,
                limit,
            };
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, args, mode).await?;
        }
        Commands::Status => {
            manifest::run_status(&cfg.manifest.path)?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Get {
            page_id,
            chunks_only,
        } => {
            get::run_get(&cfg, &page_id, chunks_only).await?;
        }
        Commands::Sanitize { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
