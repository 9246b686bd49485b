//! Change events parsed from row-change notifications.
//!
//! The database trigger publishes one JSON payload per changed row:
//!
//! ```json
//! {
//!   "op": "UPDATE",
//!   "id": "42",
//!   "row": {
//!     "customer_name": "Ann Lee",
//!     "policy_type": "Auto Insurance",
//!     "auto_insurance_details": "Toyota Camry 2018 Comprehensive"
//!   }
//! }
//! ```
//!
//! `op` is the Postgres `TG_OP` value. For deletes the trigger publishes
//! the old row, so the identifier is always present; the descriptive
//! fields are ignored since a delete only removes the embedding.

use serde::Deserialize;

use crate::error::{Result, SyncError};

/// The kind of row change that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    /// A new row was inserted.
    Insert,
    /// An existing row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl ChangeOp {
    fn parse(op: &str) -> Result<Self> {
        match op {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(SyncError::Payload(format!("unknown operation '{other}'"))),
        }
    }
}

/// The descriptive fields of a watched row, as published by the trigger.
///
/// All fields are optional; the trigger sends empty strings for policy
/// types a customer does not hold, and unknown JSON keys are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PolicyRow {
    /// The customer's full name.
    #[serde(default)]
    pub customer_name: Option<String>,
    /// The policy type(s), e.g. "Auto Insurance".
    #[serde(default)]
    pub policy_type: Option<String>,
    /// Life-policy sub-fields (beneficiary, term, sum assured).
    #[serde(default)]
    pub life_insurance_details: Option<String>,
    /// Home-policy sub-fields (property address, type, coverage).
    #[serde(default)]
    pub home_insurance_details: Option<String>,
    /// Auto-policy sub-fields (vehicle make, model, year, coverage).
    #[serde(default)]
    pub auto_insurance_details: Option<String>,
}

impl PolicyRow {
    /// Build the descriptive text the embedding is computed from.
    ///
    /// Joins the customer name, policy type, and every populated
    /// policy-specific sub-field with single spaces. Empty and missing
    /// fields are skipped so the text never carries stray whitespace.
    pub fn describe(&self) -> String {
        [
            &self.customer_name,
            &self.policy_type,
            &self.life_insurance_details,
            &self.home_insurance_details,
            &self.auto_insurance_details,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct WirePayload {
    op: String,
    id: String,
    #[serde(default)]
    row: Option<PolicyRow>,
}

/// One row change, consumed exactly once by the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The changed row's identifier.
    pub id: String,
    /// What happened to the row.
    pub op: ChangeOp,
    /// The row payload; always present for inserts and updates.
    pub row: Option<PolicyRow>,
    /// How many processing attempts have failed so far.
    pub attempts: u32,
}

impl ChangeEvent {
    /// Parse a notification payload into a change event.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Payload`] if the payload is not valid JSON, the
    /// operation is unknown, the identifier is empty, or an insert/update
    /// arrives without a row.
    pub fn parse(payload: &str) -> Result<Self> {
        let wire: WirePayload = serde_json::from_str(payload)
            .map_err(|e| SyncError::Payload(format!("invalid JSON: {e}")))?;

        let op = ChangeOp::parse(&wire.op)?;
        if wire.id.is_empty() {
            return Err(SyncError::Payload("empty record identifier".to_string()));
        }
        if wire.row.is_none() && op != ChangeOp::Delete {
            return Err(SyncError::Payload(format!("{:?} payload without a row", op)));
        }

        Ok(Self { id: wire.id, op, row: wire.row, attempts: 0 })
    }
}
