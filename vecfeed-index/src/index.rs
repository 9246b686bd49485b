//! Vector index trait for storing embedding records.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::EmbeddingRecord;

/// A storage backend for [`EmbeddingRecord`]s, keyed by record identifier.
///
/// The interface is deliberately narrow: the synchronizer only ever creates
/// a collection, deletes records by identifier, and inserts freshly computed
/// records. There is no atomic upsert — replacement is an explicit
/// delete-then-insert pair issued by the caller, and no transactional
/// guarantee is assumed across the two calls.
///
/// # Example
///
/// ```rust,ignore
/// use vecfeed_index::{InMemoryIndex, VectorIndex};
///
/// let index = InMemoryIndex::new();
/// index.ensure_collection("policies", 1536).await?;
/// index.delete("policies", &["C-100"]).await?;
/// index.insert("policies", &[record]).await?;
/// ```
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create a named collection if it does not already exist.
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its records.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Insert records into a collection.
    ///
    /// Callers delete any existing record for an identifier first; inserting
    /// a duplicate identifier is a backend error, not a merge.
    async fn insert(&self, collection: &str, records: &[EmbeddingRecord]) -> Result<()>;

    /// Delete records by their identifiers. Unknown identifiers are ignored.
    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()>;
}
