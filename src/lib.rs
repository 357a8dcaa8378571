//! ```text
//! Transcript ──► chunking::split ──► pipeline::Distiller
//!                                          │
//!                                          ├─► backend::ExtractionBackend (per chunk, retried)
//!                                          ├─► progress::ChunkProgressStore (persist / resume)
//!                                          └─► merge + cleanup ──► ExtractionRecord
//!
//! ExtractionRecord ──► store::KnowledgeStore::upsert_session ──► items + FTS5
//!                                          │
//! embeddings::backfill ────────────────────┴──► item_embeddings
//!
//! Query ──► store::search_hybrid (FTS5 ⊕ vectors, RRF) ──► SearchHit
//! ```
//!
pub mod backend;
pub mod chunking;
pub mod cleanup;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod similarity;
pub mod store;

pub use backend::{ExtractionBackend, GatewayBackend};
pub use config::DistillConfig;
pub use embeddings::{EmbeddingClient, EmbeddingProvider, HttpEmbeddingProvider};
pub use error::{DistillError, Result};
pub use merge::merge_records;
pub use pipeline::{Distiller, ProgressSink, SourceId};
pub use progress::{ChunkProgressEntry, ChunkProgressStore};
pub use record::{ExtractionRecord, ItemCategory};
pub use store::{KnowledgeStore, SearchHit, SessionMeta};
