//! Database models

use crate::types::{Classification, DelayReason, GeoPoint, StatusCategory};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Tracked entity (`shipments` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub tracking_id: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Observation event (`shipment_events` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub id: i64,
    pub shipment_id: i64,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub raw_status_text: String,
    pub classification: Classification,
    pub position: GeoPoint,
}

impl ShipmentEvent {
    pub fn status(&self) -> StatusCategory {
        self.classification.status()
    }

    pub fn delay_reason(&self) -> Option<DelayReason> {
        self.classification.reason()
    }
}

/// Count of delayed events per reason (KPI)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayReasonCount {
    pub reason: DelayReason,
    pub count: i64,
}

/// Latest known position of an undelivered shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveLocation {
    pub shipment_id: i64,
    pub tracking_id: String,
    pub location: Option<String>,
    pub status: StatusCategory,
    pub timestamp: DateTime<Utc>,
    pub position: GeoPoint,
}

/// Canonical stored form of timestamps
///
/// Fixed precision and a `Z` suffix keep lexical order equal to
/// chronological order, which the `ORDER BY timestamp` queries rely on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Bad stored timestamp '{}': {}", value, e)))
}

pub(crate) fn shipment_from_row(row: &SqliteRow) -> Result<Shipment> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Shipment {
        id: row.try_get("id")?,
        tracking_id: row.try_get("tracking_id")?,
        origin: row.try_get("origin")?,
        destination: row.try_get("destination")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub(crate) fn event_from_row(row: &SqliteRow) -> Result<ShipmentEvent> {
    let timestamp: String = row.try_get("timestamp")?;
    let status: String = row.try_get("status")?;
    let reason: Option<String> = row.try_get("delay_reason")?;

    let status: StatusCategory = status.parse()?;
    let reason = reason.map(|r| r.parse::<DelayReason>()).transpose()?;

    Ok(ShipmentEvent {
        id: row.try_get("id")?,
        shipment_id: row.try_get("shipment_id")?,
        timestamp: parse_timestamp(&timestamp)?,
        location: row.try_get("location")?,
        raw_status_text: row.try_get("raw_status_text")?,
        classification: Classification::from_parts(status, reason)?,
        position: GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?),
    })
}
