//! Persistence gateway
//!
//! Writes one classified event per call, in one transaction: entity upsert,
//! near-duplicate check against the entity's latest event, event insert.

use super::normalizer::NormalizedEvent;
use crate::utils::retry_transient;
use chrono::Utc;
use logitrack_common::config::DedupConfig;
use logitrack_common::db::{format_timestamp, queries, ShipmentEvent};
use logitrack_common::{Classification, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};

/// Transactions held longer than this are logged
const SLOW_TRANSACTION: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreOutcome {
    Stored { event_id: i64 },
    Deduplicated,
}

pub struct PersistenceGateway {
    pool: SqlitePool,
    dedup: DedupConfig,
    max_attempts: u32,
}

impl PersistenceGateway {
    pub fn new(pool: SqlitePool, dedup: DedupConfig, max_attempts: u32) -> Self {
        Self {
            pool,
            dedup,
            max_attempts,
        }
    }

    /// Same classification, within the distance threshold, and closer in
    /// time than the minimum interval
    pub fn is_duplicate(
        &self,
        previous: &ShipmentEvent,
        event: &NormalizedEvent,
        classification: Classification,
    ) -> bool {
        let elapsed_ms = (event.timestamp - previous.timestamp).num_milliseconds().unsigned_abs();

        previous.classification == classification
            && previous.position.distance_meters(&event.position) <= self.dedup.distance_meters
            && u128::from(elapsed_ms) < self.dedup.min_interval().as_millis()
    }

    /// Store an event, retrying transient failures
    pub async fn upsert(
        &self,
        event: &NormalizedEvent,
        classification: Classification,
    ) -> Result<StoreOutcome> {
        retry_transient("event upsert", self.max_attempts, move || {
            self.try_upsert(event, classification)
        })
        .await
    }

    async fn try_upsert(
        &self,
        event: &NormalizedEvent,
        classification: Classification,
    ) -> Result<StoreOutcome> {
        let started = Instant::now();
        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        let shipment_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO shipments (tracking_id, origin, destination, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(tracking_id) DO UPDATE SET
                origin = COALESCE(shipments.origin, excluded.origin),
                destination = COALESCE(shipments.destination, excluded.destination)
            RETURNING id
            "#,
        )
        .bind(&event.external_id)
        .bind(&event.origin)
        .bind(&event.destination)
        .bind(format_timestamp(&Utc::now()))
        .fetch_one(&mut *tx)
        .await?;

        if let Some(previous) = queries::latest_event(&mut *tx, shipment_id).await? {
            if self.is_duplicate(&previous, event, classification) {
                tx.commit().await?;
                tracing::debug!(
                    external_id = %event.external_id,
                    previous_event = previous.id,
                    "Near-duplicate event dropped"
                );
                return Ok(StoreOutcome::Deduplicated);
            }
        }

        let event_id = sqlx::query(
            r#"
            INSERT INTO shipment_events
                (shipment_id, timestamp, location, raw_status_text, status, delay_reason,
                 latitude, longitude, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(shipment_id)
        .bind(format_timestamp(&event.timestamp))
        .bind(&event.location)
        .bind(&event.raw_status_text)
        .bind(classification.status().as_str())
        .bind(classification.reason().map(|r| r.as_str()))
        .bind(event.position.latitude)
        .bind(event.position.longitude)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        let held = started.elapsed();
        if held > SLOW_TRANSACTION {
            tracing::info!(
                held_ms = held.as_millis() as u64,
                "Event transaction held longer than expected"
            );
        }

        tracing::debug!(
            external_id = %event.external_id,
            event_id,
            classification = %classification,
            "Event stored"
        );
        Ok(StoreOutcome::Stored { event_id })
    }
}
