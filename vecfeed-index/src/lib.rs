//! # vecfeed-index
//!
//! Embedding providers and vector index backends for the vecfeed
//! change-feed synchronizer.
//!
//! The crate defines two seams:
//!
//! - [`EmbeddingProvider`] — text in, fixed-length vector out
//! - [`VectorIndex`] — delete-by-identifier and insert, no atomic upsert
//!
//! and ships backends behind feature flags:
//!
//! - `openai` — [`OpenAIEmbeddingProvider`](openai::OpenAIEmbeddingProvider)
//!   over the OpenAI embeddings API
//! - `pgvector` — [`PgVectorIndex`](pgvector::PgVectorIndex) on PostgreSQL
//!   with the pgvector extension
//! - `qdrant` — [`QdrantIndex`](qdrant::QdrantIndex) on a standalone Qdrant
//!   server
//!
//! [`InMemoryIndex`] is always available and backs the test suites.

pub mod embedding;
pub mod error;
pub mod index;
pub mod inmemory;
pub mod record;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "pgvector")]
pub mod pgvector;

#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use embedding::EmbeddingProvider;
pub use error::{IndexError, Result};
pub use index::VectorIndex;
pub use inmemory::InMemoryIndex;
pub use record::EmbeddingRecord;

#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;

#[cfg(feature = "pgvector")]
pub use pgvector::PgVectorIndex;

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantIndex;
