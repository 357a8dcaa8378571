//! Schema bootstrap and migrations for the knowledge store.
//!
//! Everything runs on open: pragmas come from the connect options, then the
//! legacy migration, then idempotent `CREATE TABLE IF NOT EXISTS` statements.
//! The migration never drops data; it uses rename-copy-drop.

use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    project_key TEXT NOT NULL,
    source_hash TEXT,
    extracted_at TEXT,
    source_bytes INTEGER,
    message_count INTEGER,
    transcript_chars INTEGER,
    decisions INTEGER DEFAULT 0,
    ideas INTEGER DEFAULT 0,
    questions INTEGER DEFAULT 0,
    action_items INTEGER DEFAULT 0,
    concepts INTEGER DEFAULT 0,
    terms INTEGER DEFAULT 0,
    tldr TEXT
);

CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    content TEXT NOT NULL,
    detail TEXT,
    owner TEXT,
    date TEXT,
    UNIQUE(session_id, category, content)
);

CREATE TABLE IF NOT EXISTS item_embeddings (
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    model TEXT NOT NULL DEFAULT 'all-mpnet-base-v2',
    embedding BLOB NOT NULL,
    PRIMARY KEY (item_id, model)
);

CREATE TABLE IF NOT EXISTS chunk_progress (
    session_id TEXT NOT NULL,
    source_hash TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_size INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    record_json TEXT NOT NULL,
    extracted_at TEXT NOT NULL,
    PRIMARY KEY (session_id, source_hash, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_items_session ON items(session_id);
CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_key);
"#;

const EMBEDDINGS_MIGRATION: &str = r#"
ALTER TABLE item_embeddings RENAME TO item_embeddings_old;

CREATE TABLE item_embeddings (
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    model TEXT NOT NULL DEFAULT 'all-mpnet-base-v2',
    embedding BLOB NOT NULL,
    PRIMARY KEY (item_id, model)
);

INSERT INTO item_embeddings (item_id, model, embedding)
SELECT item_id, 'all-MiniLM-L6-v2', embedding
FROM item_embeddings_old;

DROP TABLE item_embeddings_old;
"#;

pub(crate) async fn init(pool: &SqlitePool) -> Result<()> {
    migrate(pool).await?;
    sqlx::raw_sql(SCHEMA).execute(pool).await?;

    // FTS5 virtual tables do not support IF NOT EXISTS, so probe first.
    // Standalone (not content-synced): the index writer mirrors rows itself.
    let fts_exists: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'items_fts'",
    )
    .fetch_optional(pool)
    .await?;
    if fts_exists.is_none() {
        sqlx::query("CREATE VIRTUAL TABLE items_fts USING fts5(content, detail)")
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Rebuild `item_embeddings` with the composite (item_id, model) key when an
/// older single-column-key table is found. Rows from the old table are
/// attributed to the model that produced them at the time.
async fn migrate(pool: &SqlitePool) -> Result<()> {
    let table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'item_embeddings'",
    )
    .fetch_optional(pool)
    .await?;
    if table.is_none() {
        return Ok(());
    }

    let columns = sqlx::query("PRAGMA table_info(item_embeddings)")
        .fetch_all(pool)
        .await?;
    let has_model = columns
        .iter()
        .any(|row| row.get::<String, _>("name") == "model");
    if !has_model {
        info!("migrating item_embeddings to composite (item_id, model) key");
        sqlx::raw_sql(EMBEDDINGS_MIGRATION).execute(pool).await?;
    }
    Ok(())
}
