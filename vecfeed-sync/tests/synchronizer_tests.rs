//! Scenario tests for the synchronizer, driven entirely by in-memory fakes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vecfeed_index::{
    EmbeddingProvider, EmbeddingRecord, InMemoryIndex, Result as IndexResult, VectorIndex,
};
use vecfeed_sync::{NotificationSource, Result as SyncResult, SyncConfig, Synchronizer, control};

const COLLECTION: &str = "insurance_policy_embeddings";
const DIM: usize = 16;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Deterministic hash-based embedder that records every text it was given.
struct HashEmbedder {
    dimensions: usize,
    seen: Mutex<Vec<String>>,
}

impl HashEmbedder {
    fn new(dimensions: usize) -> Self {
        Self { dimensions, seen: Mutex::new(Vec::new()) }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            *v = ((hash.wrapping_add(i as u64)) as f32).sin();
        }
        emb
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> IndexResult<Vec<f32>> {
        self.seen.lock().unwrap().push(text.to_string());
        Ok(self.vector_for(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Fails the first `fail_first` embed calls, then behaves like [`HashEmbedder`].
struct FlakyEmbedder {
    inner: HashEmbedder,
    fail_first: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    fn new(dimensions: usize, fail_first: usize) -> Self {
        Self { inner: HashEmbedder::new(dimensions), fail_first, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> IndexResult<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(vecfeed_index::IndexError::Embedding {
                provider: "Flaky".into(),
                message: format!("transient failure #{}", call + 1),
            });
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Never completes an embed call; exercises the call timeout.
struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed(&self, _text: &str) -> IndexResult<Vec<f32>> {
        std::future::pending().await
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum IndexOp {
    Delete(String),
    Insert(String),
}

/// An [`InMemoryIndex`] that records the order of delete and insert calls.
struct RecordingIndex {
    inner: InMemoryIndex,
    ops: Mutex<Vec<IndexOp>>,
}

impl RecordingIndex {
    fn new() -> Self {
        Self { inner: InMemoryIndex::new(), ops: Mutex::new(Vec::new()) }
    }

    fn ops(&self) -> Vec<IndexOp> {
        self.ops.lock().unwrap().clone()
    }

    async fn fetch(&self, collection: &str, id: &str) -> Option<EmbeddingRecord> {
        self.inner.fetch(collection, id).await
    }

    async fn len(&self, collection: &str) -> usize {
        self.inner.len(collection).await
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> IndexResult<()> {
        self.inner.ensure_collection(name, dimensions).await
    }

    async fn drop_collection(&self, name: &str) -> IndexResult<()> {
        self.inner.drop_collection(name).await
    }

    async fn insert(&self, collection: &str, records: &[EmbeddingRecord]) -> IndexResult<()> {
        {
            let mut ops = self.ops.lock().unwrap();
            for record in records {
                ops.push(IndexOp::Insert(record.id.clone()));
            }
        }
        self.inner.insert(collection, records).await
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> IndexResult<()> {
        {
            let mut ops = self.ops.lock().unwrap();
            for id in ids {
                ops.push(IndexOp::Delete((*id).to_string()));
            }
        }
        self.inner.delete(collection, ids).await
    }
}

/// Replays a fixed list of payloads, then pends forever.
struct ScriptedFeed {
    payloads: VecDeque<String>,
}

impl ScriptedFeed {
    fn new(payloads: &[&str]) -> Self {
        Self { payloads: payloads.iter().map(|p| p.to_string()).collect() }
    }
}

#[async_trait]
impl NotificationSource for ScriptedFeed {
    async fn recv(&mut self) -> SyncResult<String> {
        match self.payloads.pop_front() {
            Some(payload) => Ok(payload),
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> SyncConfig {
    SyncConfig::builder().build().unwrap()
}

fn synchronizer(
    config: SyncConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
) -> Synchronizer {
    Synchronizer::builder().config(config).embedder(embedder).index(index).build().unwrap()
}

fn insert_payload(id: &str, name: &str, policy: &str) -> String {
    format!(r#"{{"op":"INSERT","id":"{id}","row":{{"customer_name":"{name}","policy_type":"{policy}"}}}}"#)
}

fn update_payload(id: &str, name: &str, policy: &str) -> String {
    format!(r#"{{"op":"UPDATE","id":"{id}","row":{{"customer_name":"{name}","policy_type":"{policy}"}}}}"#)
}

fn delete_payload(id: &str) -> String {
    format!(r#"{{"op":"DELETE","id":"{id}"}}"#)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upsert_embeds_row_text_and_deletes_before_insert() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(RecordingIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    let report = sync.process_cycle().await;

    assert_eq!(report.upserted, 1);
    assert_eq!(report.failed, 0);

    let seen = embedder.seen();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("Ann Lee"), "embedded text missing customer name: {}", seen[0]);
    assert!(seen[0].contains("Auto Insurance"), "embedded text missing policy type: {}", seen[0]);

    assert_eq!(
        index.ops(),
        vec![IndexOp::Delete("C-100".to_string()), IndexOp::Insert("C-100".to_string())]
    );
    assert!(index.fetch(COLLECTION, "C-100").await.is_some());
}

#[tokio::test]
async fn batch_coalesces_to_latest_payload_per_identifier() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(RecordingIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    sync.on_notification(&insert_payload("C-101", "Bob Ray", "Home Insurance"));
    sync.on_notification(&update_payload("C-100", "Ann Lee-Chang", "Auto Insurance"));
    let report = sync.process_cycle().await;

    // Three notifications, two distinct identifiers, two upserts.
    assert_eq!(report.upserted, 2);
    assert_eq!(index.len(COLLECTION).await, 2);

    // The superseded payload was never embedded.
    let seen = embedder.seen();
    assert_eq!(seen.len(), 2);
    assert!(!seen.contains(&"Ann Lee Auto Insurance".to_string()));

    let record = index.fetch(COLLECTION, "C-100").await.unwrap();
    assert!(record.text.contains("Ann Lee-Chang"));
}

#[tokio::test]
async fn malformed_payload_is_dropped_without_poisoning_the_batch() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification("{this is not json");
    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    assert_eq!(sync.pending(), 1);

    let report = sync.process_cycle().await;
    assert_eq!(report.upserted, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(index.len(COLLECTION).await, 1);
}

#[tokio::test]
async fn transient_failure_is_retried_until_it_succeeds() {
    let embedder = Arc::new(FlakyEmbedder::new(DIM, 2));
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));

    let first = sync.process_cycle().await;
    assert_eq!((first.upserted, first.requeued, first.failed), (0, 1, 0));

    let second = sync.process_cycle().await;
    assert_eq!((second.upserted, second.requeued, second.failed), (0, 1, 0));

    let third = sync.process_cycle().await;
    assert_eq!((third.upserted, third.requeued, third.failed), (1, 0, 0));

    // Exactly one upsert resulted from the three attempts.
    assert_eq!(embedder.calls(), 3);
    assert_eq!(index.len(COLLECTION).await, 1);
    assert!(sync.pending() == 0);
}

#[tokio::test]
async fn event_is_dropped_after_exhausting_its_retry_budget() {
    let embedder = Arc::new(FlakyEmbedder::new(DIM, usize::MAX));
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let config = SyncConfig::builder().max_attempts(2).build().unwrap();
    let sync = synchronizer(config, embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));

    let first = sync.process_cycle().await;
    assert_eq!((first.requeued, first.failed), (1, 0));

    let second = sync.process_cycle().await;
    assert_eq!((second.requeued, second.failed), (0, 1));

    // Permanently failed: gone from the batch, nothing in the index.
    assert!(sync.process_cycle().await.is_noop());
    assert_eq!(index.len(COLLECTION).await, 0);
}

#[tokio::test]
async fn stalled_external_call_times_out_as_a_transient_failure() {
    let embedder = Arc::new(StalledEmbedder);
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let config = SyncConfig::builder()
        .call_timeout(Duration::from_millis(50))
        .max_attempts(2)
        .build()
        .unwrap();
    let sync = synchronizer(config, embedder, index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    let report = sync.process_cycle().await;

    assert_eq!((report.upserted, report.requeued), (0, 1));
}

#[tokio::test]
async fn reprocessing_the_same_payload_is_idempotent() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    sync.process_cycle().await;
    let first = index.fetch(COLLECTION, "C-100").await.unwrap();

    // Simulate a re-delivery of the same change.
    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    let report = sync.process_cycle().await;

    assert_eq!(report.upserted, 1);
    assert_eq!(index.len(COLLECTION).await, 1);
    let second = index.fetch(COLLECTION, "C-100").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn delete_event_removes_the_embedding() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(RecordingIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();
    let sync = synchronizer(config(), embedder.clone(), index.clone());

    sync.on_notification(&insert_payload("C-100", "Ann Lee", "Auto Insurance"));
    sync.process_cycle().await;
    assert_eq!(index.len(COLLECTION).await, 1);

    sync.on_notification(&delete_payload("C-100"));
    let report = sync.process_cycle().await;

    assert_eq!(report.deleted, 1);
    assert_eq!(index.len(COLLECTION).await, 0);
    // A delete never calls the embedding provider.
    assert_eq!(embedder.seen().len(), 1);
}

#[tokio::test]
async fn shutdown_drains_pending_events_before_returning() {
    let embedder = Arc::new(HashEmbedder::new(DIM));
    let index = Arc::new(InMemoryIndex::new());
    index.ensure_collection(COLLECTION, DIM).await.unwrap();

    // An interval far beyond the test's lifetime: only the final
    // shutdown drain can process the batch.
    let config = SyncConfig::builder().interval(Duration::from_secs(3600)).build().unwrap();
    let sync = Arc::new(synchronizer(config, embedder, index.clone()));

    let (shutdown_tx, shutdown_rx) = control::shutdown_channel();
    let handle = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move {
            let mut feed =
                ScriptedFeed::new(&[&insert_payload("C-100", "Ann Lee", "Auto Insurance")]);
            sync.run(&mut feed, shutdown_rx).await
        }
    });

    // Let the run loop pick up the scripted notification.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sync.pending(), 1);

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    result.expect("run did not observe shutdown").unwrap().unwrap();

    // The pending event was processed before connections were released.
    assert_eq!(index.len(COLLECTION).await, 1);
    assert!(index.fetch(COLLECTION, "C-100").await.is_some());
}

// ---------------------------------------------------------------------------
// Property: one cycle applies exactly the latest payload per identifier
// ---------------------------------------------------------------------------

mod prop_cycle_last_write_wins {
    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, Clone)]
    enum Change {
        Upsert(String),
        Delete,
    }

    fn arb_changes() -> impl Strategy<Value = Vec<(String, Change)>> {
        proptest::collection::vec(
            (
                "C-10[0-3]",
                prop_oneof![
                    "[a-z]{3,10}".prop_map(Change::Upsert),
                    Just(Change::Delete),
                ],
            ),
            1..20,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn final_index_state_matches_latest_change(changes in arb_changes()) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let embedder = Arc::new(HashEmbedder::new(DIM));
                let index = Arc::new(InMemoryIndex::new());
                index.ensure_collection(COLLECTION, DIM).await.unwrap();
                let sync = synchronizer(config(), embedder, index.clone());

                let mut latest: HashMap<String, Change> = HashMap::new();
                for (id, change) in &changes {
                    let payload = match change {
                        Change::Upsert(name) => update_payload(id, name, "Auto Insurance"),
                        Change::Delete => delete_payload(id),
                    };
                    sync.on_notification(&payload);
                    latest.insert(id.clone(), change.clone());
                }

                let report = sync.process_cycle().await;

                // At most one application per distinct identifier.
                assert_eq!(report.upserted + report.deleted, latest.len());
                assert_eq!(report.failed, 0);

                for (id, change) in &latest {
                    let stored = index.fetch(COLLECTION, id).await;
                    match change {
                        Change::Upsert(name) => {
                            let record = stored.expect("latest change was an upsert");
                            assert!(record.text.contains(name.as_str()));
                        }
                        Change::Delete => assert!(stored.is_none()),
                    }
                }
            });
        }
    }
}
