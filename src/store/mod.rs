//! SQLite-backed knowledge store.
//!
//! One database holds session metadata, flattened knowledge items, their
//! embeddings, a standalone FTS5 index mirroring item text, and chunk
//! progress for resumable extraction. The pool is capped at a single
//! connection: SQLite is the single writer here and WAL covers concurrent
//! readers out of process.

mod schema;
mod search;

pub use search::SearchHit;

use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::Result;
use crate::progress::ChunkProgressStore;
use crate::record::ExtractionRecord;

/// Session-level metadata recorded alongside the extracted items.
#[derive(Clone, Debug, Default)]
pub struct SessionMeta {
    pub id: String,
    pub project_key: String,
    pub source_hash: String,
    pub source_bytes: u64,
    pub message_count: u32,
    pub transcript_chars: u64,
}

/// A stored session row.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SessionSummary {
    pub id: String,
    pub project_key: String,
    pub source_hash: Option<String>,
    pub extracted_at: Option<String>,
    pub source_bytes: Option<i64>,
    pub message_count: Option<i64>,
    pub transcript_chars: Option<i64>,
    pub decisions: i64,
    pub ideas: i64,
    pub questions: i64,
    pub action_items: i64,
    pub concepts: i64,
    pub terms: i64,
    pub tldr: Option<String>,
}

/// An item lacking an embedding for some model.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct PendingItem {
    pub id: i64,
    pub content: String,
    pub detail: Option<String>,
}

/// Aggregate counts across all sessions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StoreStats {
    pub sessions: i64,
    pub decisions: i64,
    pub ideas: i64,
    pub questions: i64,
    pub action_items: i64,
    pub concepts: i64,
    pub terms: i64,
}

#[derive(Clone, Debug)]
pub struct KnowledgeStore {
    pub(crate) pool: SqlitePool,
}

impl KnowledgeStore {
    /// Open (creating if needed) a store at `path` and run schema setup.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .pragma("cache_size", "10000")
            .pragma("temp_store", "MEMORY");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        schema::init(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. The pool pins its one connection open so
    /// the database survives between calls.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        schema::init(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn progress(&self) -> ChunkProgressStore {
        ChunkProgressStore::new(self.pool.clone())
    }

    /// Replace a session and all of its items atomically.
    ///
    /// FTS rows for the old items are removed first (the FTS table is not
    /// content-synced), then the items themselves; the embedding cascade
    /// follows the item delete. New items are inserted with duplicate
    /// (category, content) pairs collapsing silently; only rows that were
    /// actually inserted are mirrored into FTS.
    #[instrument(skip_all, fields(session_id = %meta.id, items = record.item_count()))]
    pub async fn upsert_session(
        &self,
        meta: &SessionMeta,
        record: &ExtractionRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM items_fts WHERE rowid IN (SELECT id FROM items WHERE session_id = ?1)",
        )
        .bind(&meta.id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM items WHERE session_id = ?1")
            .bind(&meta.id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT OR REPLACE INTO sessions \
             (id, project_key, source_hash, extracted_at, source_bytes, message_count, \
              transcript_chars, decisions, ideas, questions, action_items, concepts, terms, tldr) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(&meta.id)
        .bind(&meta.project_key)
        .bind(&meta.source_hash)
        .bind(Utc::now().to_rfc3339())
        .bind(meta.source_bytes as i64)
        .bind(meta.message_count as i64)
        .bind(meta.transcript_chars as i64)
        .bind(record.decisions.len() as i64)
        .bind(record.ideas.len() as i64)
        .bind(record.questions.len() as i64)
        .bind(record.action_items.len() as i64)
        .bind(record.concepts.len() as i64)
        .bind(record.terms.len() as i64)
        .bind(&record.tldr)
        .execute(&mut *tx)
        .await?;

        for item in record.indexed_items() {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO items (session_id, category, content, detail, owner, date) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&meta.id)
            .bind(item.category.as_str())
            .bind(&item.content)
            .bind(&item.detail)
            .bind(&item.owner)
            .bind(&item.date)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 1 {
                sqlx::query("INSERT INTO items_fts (rowid, content, detail) VALUES (?1, ?2, ?3)")
                    .bind(result.last_insert_rowid())
                    .bind(&item.content)
                    .bind(item.detail.as_deref().unwrap_or(""))
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        Ok(
            sqlx::query_as::<_, SessionSummary>("SELECT * FROM sessions WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// True when the session is already indexed; with a non-empty
    /// `source_hash` the stored hash must also match.
    pub async fn is_indexed(&self, session_id: &str, source_hash: &str) -> Result<bool> {
        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT source_hash FROM sessions WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match stored {
            None => false,
            Some(stored) => {
                source_hash.is_empty() || stored.as_deref() == Some(source_hash)
            }
        })
    }

    pub async fn list_sessions(
        &self,
        project_key: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SessionSummary>> {
        let rows = match project_key {
            Some(key) => {
                sqlx::query_as::<_, SessionSummary>(
                    "SELECT * FROM sessions WHERE project_key = ?1 \
                     ORDER BY extracted_at DESC LIMIT ?2",
                )
                .bind(key)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, SessionSummary>(
                    "SELECT * FROM sessions ORDER BY extracted_at DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(sqlx::query_as::<_, StoreStats>(
            "SELECT COUNT(*) AS sessions, \
                    COALESCE(SUM(decisions), 0) AS decisions, \
                    COALESCE(SUM(ideas), 0) AS ideas, \
                    COALESCE(SUM(questions), 0) AS questions, \
                    COALESCE(SUM(action_items), 0) AS action_items, \
                    COALESCE(SUM(concepts), 0) AS concepts, \
                    COALESCE(SUM(terms), 0) AS terms \
             FROM sessions",
        )
        .fetch_one(&self.pool)
        .await?)
    }

    /// Items with no embedding yet for `model`.
    pub async fn get_unembedded_items(&self, model: &str) -> Result<Vec<PendingItem>> {
        Ok(sqlx::query_as::<_, PendingItem>(
            "SELECT i.id, i.content, i.detail \
             FROM items i \
             LEFT JOIN item_embeddings e ON e.item_id = i.id AND e.model = ?1 \
             WHERE e.item_id IS NULL",
        )
        .bind(model)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Store one embedding per item id as little-endian f32 blobs.
    pub async fn store_embeddings(
        &self,
        item_ids: &[i64],
        vectors: &[Vec<f32>],
        model: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (item_id, vector) in item_ids.iter().zip(vectors) {
            sqlx::query(
                "INSERT OR REPLACE INTO item_embeddings (item_id, model, embedding) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(item_id)
            .bind(model)
            .bind(encode_embedding(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
