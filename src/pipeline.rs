//! The resumable extraction pipeline.
//!
//! A transcript is split into overlapping chunks, each chunk goes through the
//! extraction backend, every completed chunk is persisted immediately, and
//! the per-chunk records are merged and normalized into one session record.
//! Interrupting a run wastes at most one chunk's worth of work: the next run
//! with the same (session, source hash) replays stored chunks and continues
//! from the first missing index.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{info, instrument, warn};

use crate::backend::{render_prompt, ExtractionBackend};
use crate::chunking;
use crate::cleanup;
use crate::config::DistillConfig;
use crate::error::Result;
use crate::merge::merge_records;
use crate::progress::{ChunkProgressEntry, ChunkProgressStore};
use crate::record::ExtractionRecord;

/// Observer for chunk-level progress. Default methods are no-ops so callers
/// implement only what they display.
pub trait ProgressSink: Send + Sync {
    /// Called once before extraction starts, with the chunk count and how
    /// many of those are already done from a previous run.
    fn begin(&self, _total_chunks: u32, _already_completed: u32) {}

    fn chunk_completed(&self, _chunk_index: u32) {}
}

/// Identity of the transcript being processed; progress and indexing key off
/// the (session_id, source_hash) pair.
#[derive(Clone, Debug)]
pub struct SourceId {
    pub session_id: String,
    pub source_hash: String,
    /// Byte size of the original artifact, which may be larger than the
    /// transcript text (picks the chunk-size tier).
    pub original_bytes: u64,
}

pub struct Distiller {
    backend: Arc<dyn ExtractionBackend>,
    progress: ChunkProgressStore,
    config: DistillConfig,
}

impl Distiller {
    pub fn new(
        backend: Arc<dyn ExtractionBackend>,
        progress: ChunkProgressStore,
        config: DistillConfig,
    ) -> Self {
        Self {
            backend,
            progress,
            config,
        }
    }

    /// Extract a full session record from `transcript`, resuming from stored
    /// chunk progress when present.
    #[instrument(skip_all, fields(session_id = %source.session_id, bytes = transcript.len()))]
    pub async fn process(
        &self,
        transcript: &str,
        source: &SourceId,
        sink: Option<&dyn ProgressSink>,
    ) -> Result<ExtractionRecord> {
        let chunk_size = self.config.chunk_size_for(source.original_bytes);
        let chunks = chunking::split(transcript, chunk_size, self.config.chunk_overlap);
        let total_chunks = chunks.len() as u32;

        let mut completed = self
            .load_valid_progress(source, chunk_size as u32, total_chunks)
            .await?;
        if let Some(sink) = sink {
            sink.begin(total_chunks, completed.len() as u32);
        }
        if !completed.is_empty() {
            info!(
                done = completed.len(),
                total = total_chunks,
                "resuming from stored chunk progress"
            );
        }

        let mut records: Vec<ExtractionRecord> = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let index = index as u32;
            if let Some(entry) = completed.remove(&index) {
                records.push(entry.record);
                continue;
            }

            let record = self.extract_with_retry(chunk).await;
            self.progress
                .record(
                    &source.session_id,
                    &source.source_hash,
                    index,
                    chunk_size as u32,
                    total_chunks,
                    &record,
                )
                .await?;
            if let Some(sink) = sink {
                sink.chunk_completed(index);
            }
            records.push(record);
        }

        let mut merged = merge_records(records);
        cleanup::normalize(&mut merged, transcript);

        self.progress
            .clear(&source.session_id, &source.source_hash)
            .await?;
        Ok(merged)
    }

    /// Stored progress for this source, or nothing if any entry disagrees
    /// with the current run's chunk geometry (the stale rows are cleared so
    /// the run starts fresh).
    async fn load_valid_progress(
        &self,
        source: &SourceId,
        chunk_size: u32,
        total_chunks: u32,
    ) -> Result<FxHashMap<u32, ChunkProgressEntry>> {
        let entries = match self
            .progress
            .completed(&source.session_id, &source.source_hash)
            .await
        {
            Ok(entries) => entries,
            Err(error) => {
                warn!(%error, "stored chunk progress unreadable, restarting");
                self.progress
                    .clear(&source.session_id, &source.source_hash)
                    .await?;
                return Ok(FxHashMap::default());
            }
        };

        let stale = entries
            .iter()
            .any(|e| e.chunk_size != chunk_size || e.total_chunks != total_chunks);
        if stale {
            info!("chunk geometry changed since last run, restarting extraction");
            self.progress
                .clear(&source.session_id, &source.source_hash)
                .await?;
            return Ok(FxHashMap::default());
        }

        Ok(entries
            .into_iter()
            .map(|e| (e.chunk_index, e))
            .collect())
    }

    /// One chunk through the backend, up to `max_retries` attempts. A chunk
    /// that never parses contributes an empty record rather than failing the
    /// whole session.
    async fn extract_with_retry(&self, chunk: &str) -> ExtractionRecord {
        let user_prompt = render_prompt(&self.config.extraction_prompt, chunk);
        for attempt in 1..=self.config.max_retries {
            match self
                .backend
                .extract(&self.config.system_prompt, &user_prompt)
                .await
            {
                Ok(record) => return record,
                Err(error) => {
                    warn!(attempt, %error, "chunk extraction attempt failed");
                }
            }
        }
        warn!(
            attempts = self.config.max_retries,
            "chunk extraction exhausted retries, recording empty result"
        );
        ExtractionRecord::default()
    }
}
