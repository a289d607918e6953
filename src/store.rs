//! Chunk stores.
//!
//! The ingest pipeline hands each updated page and its chunks to a
//! [`ChunkStore`]. Two implementations ship:
//!
//! | Kind | Layout |
//! |------|--------|
//! | `json` | one `{pageId}.json` file per page under the store directory |
//! | `sqlite` | `pages`, `chunks` and `chunks_fts` tables, searchable via `cfi search` |

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{StoreConfig, StoreKind};
use crate::db;
use crate::migrate;
use crate::models::{Chunk, ChunkMetadata, Page};

/// A page and its chunks as persisted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPage {
    pub page: Page,
    pub url: String,
    pub chunks: Vec<Chunk>,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    fn kind(&self) -> &str;

    /// Replace everything stored for `page` with `chunks`.
    async fn upsert_page(&self, page: &Page, url: &str, chunks: &[Chunk]) -> Result<()>;

    async fn get_page(&self, page_id: &str) -> Result<Option<StoredPage>>;
}

/// Open the store selected in config, creating it if needed.
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn ChunkStore>> {
    let store: Box<dyn ChunkStore> = match config.kind {
        StoreKind::Json => Box::new(JsonDirStore::open(&config.path)?),
        StoreKind::Sqlite => Box::new(SqliteStore::open(&config.path).await?),
    };
    Ok(store)
}

// ═══════════════════════════════════════════════════════════════════════
// JSON directory
// ═══════════════════════════════════════════════════════════════════════

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn page_path(&self, page_id: &str) -> PathBuf {
        // Page ids are numeric in Confluence; keep anything else from escaping the dir.
        let safe: String = page_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl ChunkStore for JsonDirStore {
    fn kind(&self) -> &str {
        "json"
    }

    async fn upsert_page(&self, page: &Page, url: &str, chunks: &[Chunk]) -> Result<()> {
        let stored = StoredPage {
            page: page.clone(),
            url: url.to_string(),
            chunks: chunks.to_vec(),
        };
        let json = serde_json::to_string_pretty(&stored)?;
        let path = self.page_path(&page.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<StoredPage>> {
        let path = self.page_path(page_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let stored = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(stored))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SQLite
// ═══════════════════════════════════════════════════════════════════════

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    fn kind(&self) -> &str {
        "sqlite"
    }

    async fn upsert_page(&self, page: &Page, url: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO pages (id, title, version, url, text, synced_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                version = excluded.version,
                url = excluded.url,
                text = excluded.text,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&page.id)
        .bind(&page.title)
        .bind(page.version as i64)
        .bind(url)
        .bind(&page.text)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks_fts WHERE page_id = ?")
            .bind(&page.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE page_id = ?")
            .bind(&page.id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            let chunk_id = Uuid::new_v4().to_string();
            sqlx::query(
                "INSERT INTO chunks (id, page_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk_id)
            .bind(&page.id)
            .bind(chunk.metadata.chunk_index as i64)
            .bind(&chunk.page_content)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, page_id, text) VALUES (?, ?, ?)")
                .bind(&chunk_id)
                .bind(&page.id)
                .bind(&chunk.page_content)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<StoredPage>> {
        let row = sqlx::query("SELECT id, title, version, url, text FROM pages WHERE id = ?")
            .bind(page_id)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let page = Page {
            id: row.get("id"),
            title: row.get("title"),
            version: row.get::<i64, _>("version") as u64,
            text: row.get("text"),
        };
        let url: String = row.get("url");

        let chunk_rows = sqlx::query(
            "SELECT chunk_index, text, hash FROM chunks WHERE page_id = ? ORDER BY chunk_index ASC",
        )
        .bind(page_id)
        .fetch_all(&self.pool)
        .await?;

        let chunks = chunk_rows
            .iter()
            .map(|r| Chunk {
                page_content: r.get("text"),
                metadata: ChunkMetadata {
                    page_id: page.id.clone(),
                    title: page.title.clone(),
                    version: page.version,
                    url: url.clone(),
                    chunk_index: r.get::<i64, _>("chunk_index") as usize,
                },
                hash: r.get("hash"),
            })
            .collect();

        Ok(Some(StoredPage { page, url, chunks }))
    }
}
