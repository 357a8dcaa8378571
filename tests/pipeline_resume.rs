//! End-to-end pipeline tests: chunked extraction, crash-resume from stored
//! progress, and geometry invalidation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use distiller::backend::ExtractionBackend;
use distiller::pipeline::{Distiller, ProgressSink, SourceId};
use distiller::record::{Decision, ExtractionRecord};
use distiller::store::KnowledgeStore;
use distiller::{chunking, DistillConfig, DistillError, Result};
use tracing_subscriber::FmtSubscriber;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_env_filter("info").finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Mutually dissimilar summaries, so the merge pass keeps one decision per
/// chunk instead of collapsing near-duplicates.
const SUMMARIES: &[&str] = &[
    "Migrate the primary database to Postgres",
    "Adopt Rust for new backend services",
    "Schedule a quarterly security audit",
    "Hire two platform engineers this year",
    "Sunset the legacy reporting dashboard",
    "Switch CI to self-hosted runners",
    "Publish the internal style guide",
    "Freeze the v2 API surface next sprint",
];

fn decision_for(call: usize) -> ExtractionRecord {
    ExtractionRecord {
        decisions: vec![Decision {
            summary: SUMMARIES[call % SUMMARIES.len()].to_string(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Backend whose output encodes the call order, so tests can tell replayed
/// chunks from re-extracted ones.
struct CountingBackend {
    calls: AtomicUsize,
}

impl CountingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionBackend for CountingBackend {
    async fn extract(&self, _system: &str, _user: &str) -> Result<ExtractionRecord> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(decision_for(call))
    }
}

struct FailingBackend;

#[async_trait]
impl ExtractionBackend for FailingBackend {
    async fn extract(&self, _system: &str, _user: &str) -> Result<ExtractionRecord> {
        Err(DistillError::Backend {
            message: "gateway unreachable".into(),
        })
    }
}

#[derive(Default)]
struct CapturingSink {
    begun: Mutex<Vec<(u32, u32)>>,
    completed: Mutex<Vec<u32>>,
}

impl ProgressSink for CapturingSink {
    fn begin(&self, total_chunks: u32, already_completed: u32) {
        self.begun.lock().unwrap().push((total_chunks, already_completed));
    }

    fn chunk_completed(&self, chunk_index: u32) {
        self.completed.lock().unwrap().push(chunk_index);
    }
}

fn config() -> DistillConfig {
    init_tracing();
    DistillConfig {
        max_chunk_size: 100,
        chunk_overlap: 10,
        chunk_size_override: true,
        max_retries: 2,
        ..Default::default()
    }
}

fn transcript() -> String {
    // Break-free text so every chunk is a full window.
    "x".repeat(450)
}

fn source() -> SourceId {
    SourceId {
        session_id: "sess-1".into(),
        source_hash: "hash-1".into(),
        original_bytes: 450,
    }
}

#[tokio::test]
async fn multi_chunk_run_processes_every_chunk_once() {
    let store = KnowledgeStore::in_memory().await.unwrap();
    let backend = CountingBackend::new();
    let distiller = Distiller::new(backend.clone(), store.progress(), config());

    let text = transcript();
    let total = chunking::split(&text, 100, 10).len();
    assert!(total > 1);

    let sink = CapturingSink::default();
    let record = distiller
        .process(&text, &source(), Some(&sink))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), total);
    assert_eq!(record.decisions.len(), total);
    assert_eq!(*sink.begun.lock().unwrap(), vec![(total as u32, 0)]);
    assert_eq!(
        sink.completed.lock().unwrap().len(),
        total,
        "every chunk reported"
    );
    // Success clears the progress rows.
    assert!(store
        .progress()
        .completed("sess-1", "hash-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn resume_skips_chunks_stored_by_an_interrupted_run() {
    let store = KnowledgeStore::in_memory().await.unwrap();
    let text = transcript();
    let total = chunking::split(&text, 100, 10).len() as u32;

    // Simulate a run that died after finishing chunks 0 and 1.
    let stored_summaries = [
        "Record meeting minutes in the wiki",
        "Rotate the on-call schedule monthly",
    ];
    let progress = store.progress();
    for (index, summary) in stored_summaries.iter().enumerate() {
        let stored = ExtractionRecord {
            decisions: vec![Decision {
                summary: (*summary).to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        progress
            .record("sess-1", "hash-1", index as u32, 100, total, &stored)
            .await
            .unwrap();
    }

    let backend = CountingBackend::new();
    let distiller = Distiller::new(backend.clone(), store.progress(), config());
    let sink = CapturingSink::default();
    let record = distiller
        .process(&text, &source(), Some(&sink))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), total as usize - 2);
    assert_eq!(*sink.begun.lock().unwrap(), vec![(total, 2)]);
    // Replayed chunk output appears in the merged record, in chunk order.
    assert_eq!(record.decisions[0].summary, stored_summaries[0]);
    assert_eq!(record.decisions[1].summary, stored_summaries[1]);
    assert_eq!(record.decisions.len(), total as usize);
}

#[tokio::test]
async fn resumed_and_uninterrupted_runs_agree() {
    let text = transcript();
    let total = chunking::split(&text, 100, 10).len() as u32;

    let uninterrupted = {
        let store = KnowledgeStore::in_memory().await.unwrap();
        let distiller = Distiller::new(CountingBackend::new(), store.progress(), config());
        distiller.process(&text, &source(), None).await.unwrap()
    };

    let resumed = {
        let store = KnowledgeStore::in_memory().await.unwrap();
        let backend = CountingBackend::new();
        // First "run": chunks 0 and 1 extracted and persisted, then death.
        let progress = store.progress();
        for index in 0..2u32 {
            let record = backend.extract("", "").await.unwrap();
            progress
                .record("sess-1", "hash-1", index, 100, total, &record)
                .await
                .unwrap();
        }
        let distiller = Distiller::new(backend, store.progress(), config());
        distiller.process(&text, &source(), None).await.unwrap()
    };

    assert_eq!(uninterrupted, resumed);
}

#[tokio::test]
async fn stored_progress_with_different_geometry_is_discarded() {
    let store = KnowledgeStore::in_memory().await.unwrap();
    let text = transcript();
    let total = chunking::split(&text, 100, 10).len() as u32;

    // Progress from a run that used a different chunk size.
    store
        .progress()
        .record(
            "sess-1",
            "hash-1",
            0,
            50,
            total * 2,
            &ExtractionRecord::default(),
        )
        .await
        .unwrap();

    let backend = CountingBackend::new();
    let distiller = Distiller::new(backend.clone(), store.progress(), config());
    distiller.process(&text, &source(), None).await.unwrap();

    // The stale entry bought nothing: every chunk was re-extracted.
    assert_eq!(backend.call_count(), total as usize);
}

#[tokio::test]
async fn unextractable_chunks_produce_an_empty_record() {
    let store = KnowledgeStore::in_memory().await.unwrap();
    let distiller = Distiller::new(Arc::new(FailingBackend), store.progress(), config());

    let record = distiller
        .process("short transcript", &source(), None)
        .await
        .unwrap();
    assert!(record.is_empty());
}
