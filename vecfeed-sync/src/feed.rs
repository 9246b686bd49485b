//! The change feed: trigger installation and notification delivery.
//!
//! On the database side, a trigger fires after every insert, update, or
//! delete on the watched table and publishes a JSON payload (see
//! [`crate::event`]) on a named channel via `pg_notify`. On this side,
//! [`ChangeFeed`] holds a persistent [`PgListener`] subscribed to that
//! channel.
//!
//! The watched table is expected to follow the `customer_insurance` layout:
//! a `customer_id` key plus the name, policy type, and per-policy columns
//! the trigger folds into the payload.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::event::PolicyRow;

/// A source of raw notification payloads.
///
/// [`ChangeFeed`] is the production implementation; tests drive the run
/// loop with scripted sources instead of a live database.
#[async_trait]
pub trait NotificationSource: Send {
    /// Receive the next notification payload.
    ///
    /// An error is connection-level and fatal to the synchronizer; there is
    /// no way to make progress without the feed.
    async fn recv(&mut self) -> Result<String>;
}

/// A persistent subscription to a table's change notifications.
pub struct ChangeFeed {
    listener: PgListener,
}

impl ChangeFeed {
    /// Install the change trigger and open a listening connection.
    ///
    /// Idempotent: the trigger function and trigger are created with
    /// `CREATE OR REPLACE`, so reconnecting an existing feed is safe.
    pub async fn connect(pool: &PgPool, config: &SyncConfig) -> Result<Self> {
        install_change_trigger(pool, config).await?;

        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(&config.channel).await?;
        info!(channel = %config.channel, table = %config.table, "listening for change notifications");

        Ok(Self { listener })
    }
}

#[async_trait]
impl NotificationSource for ChangeFeed {
    async fn recv(&mut self) -> Result<String> {
        let notification = self.listener.recv().await?;
        debug!(channel = notification.channel(), "received change notification");
        Ok(notification.payload().to_string())
    }
}

/// Ensure the database-side notification mechanism exists.
///
/// Creates (or replaces) a trigger function that publishes the changed
/// row's identifier and descriptive fields on `config.channel`, and wires
/// it to the watched table for insert, update, and delete. Deletes publish
/// the OLD row so the identifier survives; inserts and updates publish NEW.
pub async fn install_change_trigger(pool: &PgPool, config: &SyncConfig) -> Result<()> {
    let channel = &config.channel;
    let table = &config.table;

    let function_sql = format!(
        r#"
        CREATE OR REPLACE FUNCTION vecfeed_notify_{channel}() RETURNS TRIGGER AS $$
        DECLARE
            rec RECORD;
        BEGIN
            IF TG_OP = 'DELETE' THEN
                rec := OLD;
            ELSE
                rec := NEW;
            END IF;
            PERFORM pg_notify(
                '{channel}',
                json_build_object(
                    'op', TG_OP,
                    'id', rec.customer_id::text,
                    'row', json_build_object(
                        'customer_name', concat_ws(' ', rec.first_name, rec.last_name),
                        'policy_type', array_to_string(rec.policy_type, ', '),
                        'life_insurance_details', concat_ws(' ',
                            rec.life_beneficiary_name,
                            rec.life_beneficiary_relationship,
                            rec.life_sum_assured::text),
                        'home_insurance_details', concat_ws(' ',
                            rec.home_property_address,
                            rec.home_property_type,
                            rec.home_coverage_type),
                        'auto_insurance_details', concat_ws(' ',
                            rec.auto_vehicle_make,
                            rec.auto_vehicle_model,
                            rec.auto_vehicle_year::text,
                            rec.auto_coverage_type)
                    )
                )::text
            );
            RETURN NULL;
        END;
        $$ LANGUAGE plpgsql
        "#
    );

    let trigger_sql = format!(
        "CREATE OR REPLACE TRIGGER vecfeed_{channel}_trigger \
         AFTER INSERT OR UPDATE OR DELETE ON {table} \
         FOR EACH ROW EXECUTE FUNCTION vecfeed_notify_{channel}()"
    );

    sqlx::query(&function_sql).execute(pool).await?;
    sqlx::query(&trigger_sql).execute(pool).await?;

    debug!(channel = %channel, table = %table, "installed change trigger");
    Ok(())
}

/// Read every row of the watched table, shaped like the trigger payload.
///
/// Used by the full-table reindex to rebuild the collection from scratch.
/// Returns `(identifier, row)` pairs in key order.
pub async fn fetch_policy_rows(pool: &PgPool, table: &str) -> Result<Vec<(String, PolicyRow)>> {
    let sql = format!(
        "SELECT customer_id::text AS id, \
            concat_ws(' ', first_name, last_name) AS customer_name, \
            array_to_string(policy_type, ', ') AS policy_type, \
            concat_ws(' ', life_beneficiary_name, life_beneficiary_relationship, \
                life_sum_assured::text) AS life_insurance_details, \
            concat_ws(' ', home_property_address, home_property_type, \
                home_coverage_type) AS home_insurance_details, \
            concat_ws(' ', auto_vehicle_make, auto_vehicle_model, auto_vehicle_year::text, \
                auto_coverage_type) AS auto_insurance_details \
         FROM {table} ORDER BY customer_id"
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let id: String = row.get("id");
            let policy = PolicyRow {
                customer_name: Some(row.get("customer_name")),
                policy_type: Some(row.get("policy_type")),
                life_insurance_details: Some(row.get("life_insurance_details")),
                home_insurance_details: Some(row.get("home_insurance_details")),
                auto_insurance_details: Some(row.get("auto_insurance_details")),
            };
            (id, policy)
        })
        .collect())
}
