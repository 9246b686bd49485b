//! Configuration for the change-feed synchronizer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Configuration parameters for the synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// How often the processing cycle fires.
    pub interval: Duration,
    /// How many times a failing event is attempted before it is dropped.
    pub max_attempts: u32,
    /// Upper bound on any single embedding or index call.
    pub call_timeout: Duration,
    /// The notification channel the trigger publishes on.
    pub channel: String,
    /// The vector index collection holding the embeddings.
    pub collection: String,
    /// The watched source table.
    pub table: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 3,
            call_timeout: Duration::from_secs(30),
            channel: "insurance_policy_change".to_string(),
            collection: "insurance_policy_embeddings".to_string(),
            table: "customer_insurance".to_string(),
        }
    }
}

impl SyncConfig {
    /// Create a new builder for constructing a [`SyncConfig`].
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }
}

/// A valid SQL identifier: letters, digits, and underscores, not starting
/// with a digit. Channel, collection, and table names are interpolated
/// into SQL text, so anything else is rejected at configuration time.
fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!("{kind} '{value}' is not a valid identifier")))
    }
}

/// Builder for constructing a validated [`SyncConfig`].
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Set the processing cycle interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the bounded retry count for failing events.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set the timeout applied to each embedding and index call.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Set the notification channel name.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.config.channel = channel.into();
        self
    }

    /// Set the vector index collection name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.collection = collection.into();
        self
    }

    /// Set the watched source table name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    /// Build the [`SyncConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if:
    /// - `interval` or `call_timeout` is zero
    /// - `max_attempts` is zero
    /// - `channel`, `collection`, or `table` is not a valid identifier
    pub fn build(self) -> Result<SyncConfig> {
        if self.config.interval.is_zero() {
            return Err(SyncError::Config("interval must be greater than zero".to_string()));
        }
        if self.config.call_timeout.is_zero() {
            return Err(SyncError::Config("call_timeout must be greater than zero".to_string()));
        }
        if self.config.max_attempts == 0 {
            return Err(SyncError::Config("max_attempts must be greater than zero".to_string()));
        }
        validate_identifier("channel", &self.config.channel)?;
        validate_identifier("collection", &self.config.collection)?;
        validate_identifier("table", &self.config.table)?;
        Ok(self.config)
    }
}
