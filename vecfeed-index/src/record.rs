//! Data type for embedding records stored in a vector index.

use serde::{Deserialize, Serialize};

/// A vector representation of one source row, keyed by record identifier.
///
/// The index holds at most one live record per identifier. Replacement is
/// explicit delete-then-insert; backends do not merge or append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    /// The source row's identifier.
    pub id: String,
    /// The descriptive text the embedding was computed from.
    pub text: String,
    /// The embedding vector for `text`.
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    /// Create a record from an identifier, its descriptive text, and its vector.
    pub fn new(id: impl Into<String>, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self { id: id.into(), text: text.into(), embedding }
    }
}
