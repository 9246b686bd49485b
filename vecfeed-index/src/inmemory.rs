//! In-memory vector index.
//!
//! This module provides [`InMemoryIndex`], a zero-dependency index backed by
//! a `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development and testing; the synchronizer test suites run entirely
//! against it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{IndexError, Result};
use crate::index::VectorIndex;
use crate::record::EmbeddingRecord;

/// An in-memory [`VectorIndex`] keyed by record identifier.
///
/// Collections are stored as nested `HashMap`s: collection name → record ID
/// → record. Unlike a plain map write, [`insert`](VectorIndex::insert)
/// rejects a duplicate identifier, so a caller that skips the preceding
/// delete is surfaced as an error instead of silently overwritten. This
/// mirrors an append-only index and keeps the replace invariant checkable
/// in tests.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, HashMap<String, EmbeddingRecord>>>,
}

impl InMemoryIndex {
    /// Create a new empty in-memory index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the record stored for `id`, if any.
    pub async fn fetch(&self, collection: &str, id: &str) -> Option<EmbeddingRecord> {
        let collections = self.collections.read().await;
        collections.get(collection).and_then(|records| records.get(id).cloned())
    }

    /// Return the number of records in a collection (0 if it does not exist).
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map_or(0, HashMap::len)
    }

    /// Return `true` if the collection holds no records.
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    fn missing(collection: &str) -> IndexError {
        IndexError::Index {
            backend: "InMemory".to_string(),
            message: format!("collection '{collection}' does not exist"),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, name: &str, _dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn insert(&self, collection: &str, records: &[EmbeddingRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;
        for record in records {
            if store.contains_key(&record.id) {
                return Err(IndexError::Index {
                    backend: "InMemory".to_string(),
                    message: format!("duplicate record id '{}' (delete it first)", record.id),
                });
            }
        }
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| Self::missing(collection))?;
        for id in ids {
            store.remove(*id);
        }
        Ok(())
    }
}
