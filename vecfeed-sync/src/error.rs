//! Error types for the `vecfeed-sync` crate.

use std::time::Duration;

use thiserror::Error;
use vecfeed_index::IndexError;

/// Errors that can occur in the change-feed synchronizer.
///
/// The taxonomy follows how each failure is handled:
///
/// - [`Payload`](SyncError::Payload) — a malformed notification; dropped
///   immediately with a log entry, never retried.
/// - [`Index`](SyncError::Index) and [`Timeout`](SyncError::Timeout) —
///   transient per-event failures; retried with a bounded attempt count.
/// - [`Database`](SyncError::Database) — connection-level failure to the
///   source database; fatal, propagated to the process boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A change notification payload could not be parsed.
    #[error("Malformed change payload: {0}")]
    Payload(String),

    /// A source-database error (connection, listen, trigger installation).
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// An embedding or vector index error.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// An external call exceeded the configured timeout.
    #[error("External call timed out after {0:?}")]
    Timeout(Duration),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for synchronizer operations.
pub type Result<T> = std::result::Result<T, SyncError>;
