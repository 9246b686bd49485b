//! The change-feed synchronizer.
//!
//! [`Synchronizer`] keeps a vector index's embeddings eventually consistent
//! with the watched table. Notifications append to a [`PendingBatch`]; a
//! fixed-interval cycle drains the batch, coalesces it last-write-wins per
//! identifier, embeds each surviving row, and replaces the index record
//! with delete-then-insert. Construct one via [`Synchronizer::builder()`].
//!
//! # Example
//!
//! ```rust,ignore
//! use vecfeed_sync::{ChangeFeed, SyncConfig, Synchronizer, control};
//!
//! let synchronizer = Synchronizer::builder()
//!     .config(SyncConfig::default())
//!     .embedder(Arc::new(provider))
//!     .index(Arc::new(index))
//!     .build()?;
//!
//! let mut feed = ChangeFeed::connect(&pool, synchronizer.config()).await?;
//! let (shutdown_tx, shutdown_rx) = control::shutdown_channel();
//! synchronizer.run(&mut feed, shutdown_rx).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vecfeed_index::{EmbeddingProvider, EmbeddingRecord, VectorIndex};

use crate::batch::{PendingBatch, coalesce_latest};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::event::{ChangeEvent, ChangeOp};
use crate::feed::{NotificationSource, fetch_policy_rows};

/// How many rows are embedded per provider call during a reindex.
const REINDEX_BATCH: usize = 64;

/// Counters reported by one processing cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Events whose embedding was replaced in the index.
    pub upserted: usize,
    /// Events whose embedding was removed from the index.
    pub deleted: usize,
    /// Events that failed transiently and were re-queued.
    pub requeued: usize,
    /// Events dropped after exhausting their retry budget.
    pub failed: usize,
}

impl CycleReport {
    /// Whether the cycle had nothing to do.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

enum Applied {
    Upserted,
    Deleted,
}

/// The change-feed synchronizer.
///
/// Owns the embedding provider and vector index handles plus the pending
/// batch shared between the notification path and the processing cycle.
pub struct Synchronizer {
    config: SyncConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch: PendingBatch,
}

impl Synchronizer {
    /// Create a new [`SynchronizerBuilder`].
    pub fn builder() -> SynchronizerBuilder {
        SynchronizerBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The number of events currently waiting for the next cycle.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Handle one raw notification payload.
    ///
    /// Purely an in-memory append: parsing aside, no embedding or network
    /// work happens here, so the notification-delivery path is never
    /// blocked by a slow cycle. A malformed payload is logged and dropped;
    /// it never enters the batch and never panics the listener.
    pub fn on_notification(&self, payload: &str) {
        match ChangeEvent::parse(payload) {
            Ok(event) => {
                debug!(id = %event.id, op = ?event.op, "queued change event");
                self.batch.push(event);
            }
            Err(e) => warn!(error = %e, "dropping malformed change payload"),
        }
    }

    /// Drain and process the pending batch once.
    ///
    /// Takes ownership of the current batch with an atomic swap, collapses
    /// it to the latest event per identifier, and applies the survivors in
    /// arrival order. A transiently failing event is re-queued with its
    /// attempt count incremented; once it has failed
    /// [`SyncConfig::max_attempts`] times it is logged and dropped. The
    /// cycle itself never fails — per-event errors are contained so the
    /// schedule stays self-sustaining.
    pub async fn process_cycle(&self) -> CycleReport {
        let drained = self.batch.drain();
        if drained.is_empty() {
            return CycleReport::default();
        }

        let events = coalesce_latest(drained);
        info!(count = events.len(), "processing change batch");

        let mut report = CycleReport::default();
        let mut requeue = Vec::new();

        for mut event in events {
            match self.apply(&event).await {
                Ok(Applied::Upserted) => report.upserted += 1,
                Ok(Applied::Deleted) => report.deleted += 1,
                Err(e) => {
                    event.attempts += 1;
                    if event.attempts >= self.config.max_attempts {
                        error!(
                            id = %event.id,
                            attempts = event.attempts,
                            error = %e,
                            "change permanently failed, dropping"
                        );
                        report.failed += 1;
                    } else {
                        warn!(
                            id = %event.id,
                            attempts = event.attempts,
                            error = %e,
                            "change failed, re-queueing for next cycle"
                        );
                        requeue.push(event);
                        report.requeued += 1;
                    }
                }
            }
        }

        if !requeue.is_empty() {
            self.batch.requeue(requeue);
        }
        report
    }

    /// Apply one coalesced event to the index.
    async fn apply(&self, event: &ChangeEvent) -> Result<Applied> {
        let collection = &self.config.collection;
        let id = event.id.as_str();

        if event.op == ChangeOp::Delete {
            self.bounded(self.index.delete(collection, &[id])).await?;
            debug!(id, "removed embedding for deleted row");
            return Ok(Applied::Deleted);
        }

        let row = event
            .row
            .as_ref()
            .ok_or_else(|| SyncError::Payload(format!("event '{id}' has no row")))?;
        let text = row.describe();
        let embedding = self.bounded(self.embedder.embed(&text)).await?;
        let record = EmbeddingRecord::new(id, text, embedding);

        // Replacement is two calls with no transaction across them. If the
        // insert fails after the delete succeeded, the identifier is briefly
        // missing from the index until the retry re-runs both steps.
        self.bounded(self.index.delete(collection, &[id])).await?;
        self.bounded(self.index.insert(collection, std::slice::from_ref(&record))).await?;
        debug!(id, "replaced embedding");
        Ok(Applied::Upserted)
    }

    /// Bound an external call by the configured timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = vecfeed_index::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::Timeout(self.config.call_timeout)),
        }
    }

    /// Run the synchronizer until shutdown is requested.
    ///
    /// Drives three concerns in one task: receiving notifications from the
    /// feed, firing [`process_cycle`](Self::process_cycle) every
    /// [`SyncConfig::interval`], and watching the shutdown flag. Once the
    /// flag is set, no further notifications are accepted and one final
    /// best-effort cycle drains whatever is still pending before the feed
    /// is released.
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the notification feed fails;
    /// connection loss is fatal since no progress is possible without it.
    pub async fn run<S: NotificationSource>(
        &self,
        source: &mut S,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately; consume it so
        // the first real cycle lands one full interval from now.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.process_cycle().await;
                }
                payload = source.recv() => {
                    self.on_notification(&payload?);
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(pending = self.batch.len(), "shutdown requested, draining pending changes");
        let report = self.process_cycle().await;
        if report.requeued > 0 {
            warn!(requeued = report.requeued, "events were still failing at shutdown");
        }
        info!(
            upserted = report.upserted,
            deleted = report.deleted,
            failed = report.failed,
            "synchronizer stopped"
        );
        Ok(())
    }

    /// Rebuild the collection from the full contents of the watched table.
    ///
    /// Drops and recreates the collection, then embeds every row in batches
    /// of [`REINDEX_BATCH`]. Used for the initial backfill and to repair an
    /// index that has drifted. Unlike the cycle path there is no per-row
    /// retry; any failure aborts the reindex and surfaces to the caller.
    pub async fn reindex(&self, pool: &PgPool) -> Result<usize> {
        let rows = fetch_policy_rows(pool, &self.config.table).await?;
        let collection = &self.config.collection;

        self.index.drop_collection(collection).await?;
        self.index.ensure_collection(collection, self.embedder.dimensions()).await?;

        for chunk in rows.chunks(REINDEX_BATCH) {
            let texts: Vec<String> = chunk.iter().map(|(_, row)| row.describe()).collect();
            let embeddings = {
                let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                self.embedder.embed_batch(&text_refs).await?
            };
            let records: Vec<EmbeddingRecord> = chunk
                .iter()
                .zip(texts.into_iter().zip(embeddings))
                .map(|((id, _), (text, embedding))| EmbeddingRecord::new(id.clone(), text, embedding))
                .collect();
            self.index.insert(collection, &records).await?;
        }

        info!(count = rows.len(), collection = %collection, "reindexed watched table");
        Ok(rows.len())
    }
}

/// Builder for constructing a [`Synchronizer`].
///
/// All fields are required. Call [`build()`](SynchronizerBuilder::build) to
/// validate and produce the synchronizer.
#[derive(Default)]
pub struct SynchronizerBuilder {
    config: Option<SyncConfig>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
}

impl SynchronizerBuilder {
    /// Set the synchronizer configuration.
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector index backend.
    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Build the [`Synchronizer`], validating that all fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if any required field is missing.
    pub fn build(self) -> Result<Synchronizer> {
        let config =
            self.config.ok_or_else(|| SyncError::Config("config is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| SyncError::Config("embedder is required".to_string()))?;
        let index =
            self.index.ok_or_else(|| SyncError::Config("index is required".to_string()))?;

        Ok(Synchronizer { config, embedder, index, batch: PendingBatch::new() })
    }
}
