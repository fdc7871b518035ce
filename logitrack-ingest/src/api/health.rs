//! Health check endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::feed::{ConnectionState, FeedMetricsSnapshot};
use crate::scheduler::IngestStatus;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("logitrack-ingest")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// "live", "synthetic" or "disabled"
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: String,
    pub shipments: i64,
    pub events: i64,
}

#[derive(Debug, Serialize)]
pub struct IngestHealth {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<FeedMetricsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<usize>,
    #[serde(flatten)]
    pub status: IngestStatus,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let mode = state
        .pipeline
        .as_ref()
        .map_or("disabled", |monitor| monitor.mode.as_str());

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "logitrack-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        mode: mode.to_string(),
    })
}

/// GET /health/db
pub async fn database_check(State(state): State<AppState>) -> ApiResult<Json<DatabaseHealth>> {
    let probe: i64 = sqlx::query_scalar("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::Unavailable(format!("Database probe failed: {}", e)))?;
    if probe != 1 {
        return Err(ApiError::Internal(format!("Unexpected probe result {}", probe)));
    }

    Ok(Json(DatabaseHealth {
        status: "ok".to_string(),
        shipments: logitrack_common::db::queries::count_shipments(&state.db).await?,
        events: logitrack_common::db::queries::count_events(&state.db).await?,
    }))
}

/// GET /health/ingest
pub async fn ingest_check(State(state): State<AppState>) -> Json<IngestHealth> {
    let Some(monitor) = state.pipeline.as_ref() else {
        return Json(IngestHealth {
            enabled: false,
            source: None,
            connection: None,
            feed: None,
            queued: None,
            status: IngestStatus::default(),
        });
    };

    Json(IngestHealth {
        enabled: true,
        source: Some(monitor.source.to_string()),
        connection: Some(*monitor.connection.borrow()),
        feed: Some(monitor.feed.snapshot()),
        queued: Some(monitor.queue.len()),
        status: monitor.status.borrow().clone(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(database_check))
        .route("/health/ingest", get(ingest_check))
}
