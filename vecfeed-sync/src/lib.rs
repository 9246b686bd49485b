//! # vecfeed-sync
//!
//! A change-notification-driven embedding synchronizer: listens for
//! PostgreSQL row-change notifications on a named channel, accumulates
//! them in a pending batch, and on a fixed interval converts each changed
//! record into a text embedding that replaces the old one in a vector
//! index, keeping the index eventually consistent with the source table.
//!
//! The moving parts:
//!
//! - [`ChangeFeed`] installs the notify trigger and subscribes to the
//!   channel over a persistent listener connection.
//! - [`PendingBatch`] is the sole shared mutable state between the
//!   notification path and the processing cycle; it is drained with an
//!   atomic swap.
//! - [`Synchronizer`] drives the cycle: coalesce last-write-wins, embed,
//!   delete-then-insert, with bounded retry for transient failures.
//! - [`control`] provides the cooperative shutdown flag and the operator
//!   stop command.
//!
//! Durability is an explicit non-goal: events live only in memory, and a
//! crash loses whatever has not been flushed.

pub mod batch;
pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod feed;
pub mod synchronizer;

pub use batch::PendingBatch;
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError};
pub use event::{ChangeEvent, ChangeOp, PolicyRow};
pub use feed::{ChangeFeed, NotificationSource, install_change_trigger};
pub use synchronizer::{CycleReport, Synchronizer, SynchronizerBuilder};
