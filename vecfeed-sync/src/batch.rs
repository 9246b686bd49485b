//! The pending batch shared between the listener and the processing cycle.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::event::ChangeEvent;

/// An in-memory ordered accumulator of [`ChangeEvent`]s.
///
/// The notification path appends while the processing cycle drains, so the
/// backing `Vec` sits behind a mutex. Every operation holds the lock only
/// for an O(1)-ish splice or swap; no embedding or network work ever
/// happens under it, so the notification path cannot be blocked by a slow
/// cycle.
///
/// Events are not persisted — a crash loses whatever is unflushed.
#[derive(Debug, Default)]
pub struct PendingBatch {
    events: Mutex<Vec<ChangeEvent>>,
}

impl PendingBatch {
    /// Create a new empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChangeEvent>> {
        // A panic while holding the lock cannot leave the Vec half-updated,
        // so a poisoned lock is still safe to reuse.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one event in arrival order.
    pub fn push(&self, event: ChangeEvent) {
        self.lock().push(event);
    }

    /// Atomically take the current contents, leaving the batch empty.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Put failed events back ahead of anything that arrived since the
    /// drain, preserving their original arrival order.
    pub fn requeue(&self, mut events: Vec<ChangeEvent>) {
        let mut guard = self.lock();
        events.append(&mut guard);
        *guard = events;
    }

    /// The number of events currently pending.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the batch is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Collapse a drained batch to one event per identifier, last write wins.
///
/// If the same row changed twice between cycles, only its latest payload is
/// worth embedding. The surviving events keep the arrival order of their
/// latest occurrence, so a batch of N events yields at most N upserts for
/// distinct identifiers.
pub fn coalesce_latest(events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
    let mut latest: HashMap<String, usize> = HashMap::new();
    let mut slots: Vec<Option<ChangeEvent>> = Vec::with_capacity(events.len());

    for event in events {
        if let Some(&slot) = latest.get(&event.id) {
            slots[slot] = None;
        }
        latest.insert(event.id.clone(), slots.len());
        slots.push(Some(event));
    }

    slots.into_iter().flatten().collect()
}
