//! Read-side query contract
//!
//! The dashboard's query service reads the same store the ingestion pipeline
//! writes. These queries pin down what that service relies on: filtering by
//! status, identifier or bounding box, the per-reason delay KPI, and the
//! latest position of every undelivered shipment.

use super::models::parse_timestamp;
use super::models::{
    event_from_row, shipment_from_row, DelayReasonCount, LiveLocation, Shipment, ShipmentEvent,
};
use crate::types::{BoundingBox, DelayReason, GeoPoint, StatusCategory};
use crate::Result;
use sqlx::{Row, Sqlite, SqlitePool};

const EVENT_COLUMNS: &str = "e.id, e.shipment_id, e.timestamp, e.location, e.raw_status_text, \
                             e.status, e.delay_reason, e.latitude, e.longitude";

/// Look up a shipment by its external identifier
pub async fn find_shipment(pool: &SqlitePool, tracking_id: &str) -> Result<Option<Shipment>> {
    let row = sqlx::query(
        "SELECT id, tracking_id, origin, destination, created_at \
         FROM shipments WHERE tracking_id = ?",
    )
    .bind(tracking_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(shipment_from_row).transpose()
}

pub async fn count_shipments(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shipments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_events(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shipment_events")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Most recent event for a shipment
///
/// Generic over the executor so the persistence gateway can run it inside
/// its write transaction.
pub async fn latest_event<'e, E>(executor: E, shipment_id: i64) -> Result<Option<ShipmentEvent>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM shipment_events e WHERE e.shipment_id = ? \
         ORDER BY e.timestamp DESC, e.id DESC LIMIT 1",
        EVENT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(shipment_id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(event_from_row).transpose()
}

/// Full history of one shipment, oldest first
pub async fn events_for_shipment(
    pool: &SqlitePool,
    tracking_id: &str,
) -> Result<Vec<ShipmentEvent>> {
    let sql = format!(
        "SELECT {} FROM shipment_events e JOIN shipments s ON s.id = e.shipment_id \
         WHERE s.tracking_id = ? ORDER BY e.timestamp ASC, e.id ASC",
        EVENT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(tracking_id).fetch_all(pool).await?;
    rows.iter().map(event_from_row).collect()
}

/// All events with the given status, newest first
pub async fn events_by_status(
    pool: &SqlitePool,
    status: StatusCategory,
) -> Result<Vec<ShipmentEvent>> {
    let sql = format!(
        "SELECT {} FROM shipment_events e WHERE e.status = ? ORDER BY e.timestamp DESC, e.id DESC",
        EVENT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(status.as_str()).fetch_all(pool).await?;
    rows.iter().map(event_from_row).collect()
}

/// All events positioned inside the bounding box, newest first
pub async fn events_in_bbox(pool: &SqlitePool, bbox: &BoundingBox) -> Result<Vec<ShipmentEvent>> {
    let sql = format!(
        "SELECT {} FROM shipment_events e \
         WHERE e.latitude BETWEEN ? AND ? AND e.longitude BETWEEN ? AND ? \
         ORDER BY e.timestamp DESC, e.id DESC",
        EVENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(bbox.min_latitude())
        .bind(bbox.max_latitude())
        .bind(bbox.min_longitude())
        .bind(bbox.max_longitude())
        .fetch_all(pool)
        .await?;
    rows.iter().map(event_from_row).collect()
}

/// Number of delayed events per delay reason
pub async fn delay_reason_counts(pool: &SqlitePool) -> Result<Vec<DelayReasonCount>> {
    let rows = sqlx::query(
        r#"
        SELECT delay_reason, COUNT(*) AS count
        FROM shipment_events
        WHERE status = 'Delayed'
        GROUP BY delay_reason
        ORDER BY count DESC, delay_reason ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let reason: String = row.try_get("delay_reason")?;
            Ok(DelayReasonCount {
                reason: reason.parse::<DelayReason>()?,
                count: row.try_get("count")?,
            })
        })
        .collect()
}

/// Shipments with at least one delayed event
pub async fn at_risk_shipments(pool: &SqlitePool) -> Result<Vec<Shipment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, tracking_id, origin, destination, created_at
        FROM shipments
        WHERE id IN (SELECT DISTINCT shipment_id FROM shipment_events WHERE status = 'Delayed')
        ORDER BY tracking_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(shipment_from_row).collect()
}

/// Latest event of every shipment that has not been delivered
pub async fn live_locations(pool: &SqlitePool) -> Result<Vec<LiveLocation>> {
    let rows = sqlx::query(
        r#"
        SELECT shipment_id, tracking_id, location, status, timestamp, latitude, longitude
        FROM (
            SELECT
                e.shipment_id, s.tracking_id, e.location, e.status, e.timestamp,
                e.latitude, e.longitude,
                ROW_NUMBER() OVER (
                    PARTITION BY e.shipment_id ORDER BY e.timestamp DESC, e.id DESC
                ) AS rn
            FROM shipment_events e
            JOIN shipments s ON s.id = e.shipment_id
        )
        WHERE rn = 1 AND status != 'Delivered'
        ORDER BY tracking_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let status: String = row.try_get("status")?;
            let timestamp: String = row.try_get("timestamp")?;
            Ok(LiveLocation {
                shipment_id: row.try_get("shipment_id")?,
                tracking_id: row.try_get("tracking_id")?,
                location: row.try_get("location")?,
                status: status.parse()?,
                timestamp: parse_timestamp(&timestamp)?,
                position: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
            })
        })
        .collect()
}
