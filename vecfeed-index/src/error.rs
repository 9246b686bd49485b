//! Error types for the `vecfeed-index` crate.

use thiserror::Error;

/// Errors that can occur in embedding and vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    Index {
        /// The vector index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;
