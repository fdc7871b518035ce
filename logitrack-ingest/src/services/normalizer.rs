//! Event normalizer
//!
//! Validates a raw report and resolves its tracked entity. Validation runs
//! before any store access so a rejected report never creates an entity.

use crate::feed::{NavHint, RawReport};
use crate::utils::retry_transient;
use chrono::{DateTime, Utc};
use logitrack_common::db::format_timestamp;
use logitrack_common::GeoPoint;
use sqlx::SqlitePool;
use thiserror::Error;

/// Why a report was turned away
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("coordinates out of range ({latitude}, {longitude})")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("empty status text")]
    EmptyStatusText,

    #[error("empty identifier")]
    EmptyIdentifier,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("entity resolution failed: {0}")]
    Store(#[from] logitrack_common::Error),
}

/// A validated report bound to its entity, ready for classification
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub shipment_id: i64,
    pub external_id: String,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub raw_status_text: String,
    pub nav_hint: Option<NavHint>,
    pub position: GeoPoint,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

/// Report fields after validation, before entity resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub external_id: String,
    pub raw_status_text: String,
    pub position: GeoPoint,
    pub location: String,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pure checks; no store access
pub fn validate(report: &RawReport) -> Result<ValidReport, Rejection> {
    let position = GeoPoint::new(report.latitude, report.longitude);
    if !position.is_valid() {
        return Err(Rejection::InvalidCoordinates {
            latitude: report.latitude,
            longitude: report.longitude,
        });
    }

    let raw_status_text = report.raw_status_text.trim();
    if raw_status_text.is_empty() {
        return Err(Rejection::EmptyStatusText);
    }

    let external_id = report.external_id.trim();
    if external_id.is_empty() {
        return Err(Rejection::EmptyIdentifier);
    }

    let location = non_blank(&report.location_label)
        .unwrap_or_else(|| format!("{:.4}, {:.4}", position.latitude, position.longitude));

    Ok(ValidReport {
        external_id: external_id.to_string(),
        raw_status_text: raw_status_text.to_string(),
        position,
        location,
    })
}

pub struct Normalizer {
    pool: SqlitePool,
    max_attempts: u32,
}

impl Normalizer {
    pub fn new(pool: SqlitePool, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }

    pub async fn normalize(&self, report: &RawReport) -> Result<NormalizedEvent, NormalizeError> {
        let valid = validate(report)?;
        let shipment_id = self.resolve_entity(&valid.external_id).await?;

        Ok(NormalizedEvent {
            shipment_id,
            external_id: valid.external_id,
            timestamp: report.observed_at,
            location: valid.location,
            raw_status_text: valid.raw_status_text,
            nav_hint: report.nav_hint,
            position: valid.position,
            origin: non_blank(&report.origin),
            destination: non_blank(&report.destination),
        })
    }

    /// Lookup-or-create by external identifier; safe to repeat
    pub async fn resolve_entity(&self, external_id: &str) -> logitrack_common::Result<i64> {
        retry_transient("entity resolution", self.max_attempts, move || async move {
            sqlx::query(
                "INSERT INTO shipments (tracking_id, created_at) VALUES (?, ?) \
                 ON CONFLICT(tracking_id) DO NOTHING",
            )
            .bind(external_id)
            .bind(format_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;

            let id: i64 = sqlx::query_scalar("SELECT id FROM shipments WHERE tracking_id = ?")
                .bind(external_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(id)
        })
        .await
    }
}
