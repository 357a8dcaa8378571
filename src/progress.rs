//! Per-chunk extraction progress.
//!
//! Each completed chunk is persisted as soon as its record exists, keyed by
//! (session_id, source_hash, chunk_index). A re-run with the same key pair
//! replays the stored records instead of calling the model again; a
//! successful run clears its rows.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::Result;
use crate::record::ExtractionRecord;

/// One persisted chunk result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkProgressEntry {
    pub chunk_index: u32,
    /// Chunk size the run was splitting with; a later run with a different
    /// size invalidates the stored rows.
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub record: ExtractionRecord,
    pub extracted_at: String,
}

#[derive(Clone, Debug)]
pub struct ChunkProgressStore {
    pool: SqlitePool,
}

impl ChunkProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All stored entries for the session/source pair, in chunk order.
    pub async fn completed(
        &self,
        session_id: &str,
        source_hash: &str,
    ) -> Result<Vec<ChunkProgressEntry>> {
        let rows: Vec<(i64, i64, i64, String, String)> = sqlx::query_as(
            "SELECT chunk_index, chunk_size, total_chunks, record_json, extracted_at \
             FROM chunk_progress \
             WHERE session_id = ?1 AND source_hash = ?2 \
             ORDER BY chunk_index",
        )
        .bind(session_id)
        .bind(source_hash)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (chunk_index, chunk_size, total_chunks, record_json, extracted_at) in rows {
            entries.push(ChunkProgressEntry {
                chunk_index: chunk_index as u32,
                chunk_size: chunk_size as u32,
                total_chunks: total_chunks as u32,
                record: serde_json::from_str(&record_json)?,
                extracted_at,
            });
        }
        Ok(entries)
    }

    /// Persist one completed chunk in its own transaction so a crash after
    /// this call never loses the work.
    #[instrument(skip_all, fields(session_id, chunk_index))]
    pub async fn record(
        &self,
        session_id: &str,
        source_hash: &str,
        chunk_index: u32,
        chunk_size: u32,
        total_chunks: u32,
        record: &ExtractionRecord,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO chunk_progress \
             (session_id, source_hash, chunk_index, chunk_size, total_chunks, \
              record_json, extracted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(session_id)
        .bind(source_hash)
        .bind(chunk_index)
        .bind(chunk_size)
        .bind(total_chunks)
        .bind(serde_json::to_string(record)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop all progress for the session/source pair.
    pub async fn clear(&self, session_id: &str, source_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM chunk_progress WHERE session_id = ?1 AND source_hash = ?2")
            .bind(session_id)
            .bind(source_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
