//! Page retrieval from the configured store.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::store::open_store;

/// CLI entry point for `cfi get`.
pub async fn run_get(config: &Config, page_id: &str, chunks_only: bool) -> Result<()> {
    let store = open_store(&config.store).await?;
    let stored = match store.get_page(page_id).await? {
        Some(s) => s,
        None => bail!("page not found in {} store: {}", store.kind(), page_id),
    };

    if !chunks_only {
        println!("--- Page ---");
        println!("id:       {}", stored.page.id);
        println!("title:    {}", stored.page.title);
        println!("version:  {}", stored.page.version);
        println!("url:      {}", stored.url);
        println!();

        println!("--- Text ---");
        println!("{}", stored.page.text);
        println!();
    }

    println!("--- Chunks ({}) ---", stored.chunks.len());
    for chunk in &stored.chunks {
        println!("[chunk {}] {}", chunk.metadata.chunk_index, chunk.hash);
        println!("{}", chunk.page_content);
        println!();
    }

    Ok(())
}
