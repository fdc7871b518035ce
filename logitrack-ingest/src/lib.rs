//! logitrack-ingest library interface
//!
//! Vessel position ingestion: a report source (live AISStream feed or
//! synthetic generator) feeds a bounded queue; a cycle scheduler normalizes,
//! classifies and persists each report into the shared SQLite store.

pub mod api;
pub mod error;
pub mod feed;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};
pub use crate::scheduler::{IngestPipeline, PipelineMonitor};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Running pipeline, absent when ingestion is disabled
    pub pipeline: Option<PipelineMonitor>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, pipeline: Option<PipelineMonitor>) -> Self {
        Self {
            db,
            pipeline,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
