//! Keyword search over the SQLite store.
//!
//! Chunks are matched with FTS5, scored by negated BM25, min-max normalized,
//! then grouped by page keeping each page's best chunk.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::{Config, StoreKind};
use crate::store::SqliteStore;

/// Chunks considered per requested result before grouping by page.
const CANDIDATES_PER_RESULT: i64 = 8;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub page_id: String,
    pub title: String,
    pub url: String,
    pub version: u64,
    pub score: f64,
    pub snippet: String,
}

#[derive(Debug, Clone)]
struct ChunkCandidate {
    page_id: String,
    raw_score: f64,
    snippet: String,
}

/// Search stored chunks and return at most `limit` pages, best first.
pub async fn search_pages(pool: &SqlitePool, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    let fts_query = to_fts_query(query);
    if fts_query.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT page_id, rank,
               snippet(chunks_fts, 2, '>>>', '<<<', '...', 32) AS snippet
        FROM chunks_fts
        WHERE chunks_fts MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(&fts_query)
    .bind(limit as i64 * CANDIDATES_PER_RESULT)
    .fetch_all(pool)
    .await?;

    let candidates: Vec<ChunkCandidate> = rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            ChunkCandidate {
                page_id: row.get("page_id"),
                raw_score: -rank, // negate so higher = better
                snippet: row.get("snippet"),
            }
        })
        .collect();

    // Group by page using MAX aggregation
    let mut best: HashMap<&str, (f64, &str)> = HashMap::new();
    for (cand, score) in normalize_scores(&candidates) {
        let entry = best
            .entry(cand.page_id.as_str())
            .or_insert((score, cand.snippet.as_str()));
        if score > entry.0 {
            *entry = (score, cand.snippet.as_str());
        }
    }

    let mut hits = Vec::with_capacity(best.len());
    for (page_id, (score, snippet)) in best {
        let row = sqlx::query("SELECT title, url, version FROM pages WHERE id = ?")
            .bind(page_id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = row {
            hits.push(SearchHit {
                page_id: page_id.to_string(),
                title: row.get("title"),
                url: row.get("url"),
                version: row.get::<i64, _>("version") as u64,
                score,
                snippet: snippet.to_string(),
            });
        }
    }

    // Sort: score desc, page id asc (deterministic)
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.page_id.cmp(&b.page_id))
    });
    hits.truncate(limit);
    Ok(hits)
}

/// Quote each whitespace-separated term so user input never hits FTS5 syntax.
fn to_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Min-max normalize scores to [0, 1].
fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

/// CLI entry point for `cfi search`.
pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if config.store.kind != StoreKind::Sqlite {
        bail!("search requires [store] kind = \"sqlite\"");
    }
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = SqliteStore::open(&config.store.path).await?;
    let hits = search_pages(store.pool(), query, limit).await?;
    store.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.2}] {} (v{})", i + 1, hit.score, hit.title, hit.version);
        println!("    page: {}", hit.page_id);
        println!("    url: {}", hit.url);
        println!("    excerpt: \"{}\"", hit.snippet.replace('\n', " ").trim());
        println!();
    }
    Ok(())
}
