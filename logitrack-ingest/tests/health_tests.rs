//! Health endpoint integration tests

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use logitrack_common::config::IngestConfig;
use logitrack_common::db::init_memory_database;
use logitrack_ingest::feed::{
    ConnectionState, ReportSource, SourceContext, SourceMode, SyntheticGenerator,
};
use logitrack_ingest::services::ClassificationEngine;
use logitrack_ingest::{build_router, AppState, IngestPipeline};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Live-mode source that connects and then stays idle until cancelled
struct IdleLiveSource;

#[async_trait]
impl ReportSource for IdleLiveSource {
    fn name(&self) -> &'static str {
        "idle-relay"
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Live
    }

    async fn run(self: Box<Self>, ctx: SourceContext) {
        ctx.set_state(ConnectionState::Receiving);
        ctx.cancel.cancelled().await;
        ctx.set_state(ConnectionState::Disconnected);
    }
}

#[tokio::test]
async fn test_health_without_pipeline() {
    let pool = init_memory_database().await.unwrap();
    let app = build_router(AppState::new(pool, None));

    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "logitrack-ingest");
    assert_eq!(body["mode"], "disabled");

    let (status, body) = get_json(app.clone(), "/health/ingest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    assert!(body["last_cycle"].is_null());
}

#[tokio::test]
async fn test_database_check_reports_counts_and_outage() {
    let pool = init_memory_database().await.unwrap();
    let app = build_router(AppState::new(pool.clone(), None));

    let (status, body) = get_json(app.clone(), "/health/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["shipments"], 0);
    assert_eq!(body["events"], 0);

    pool.close().await;
    let (status, body) = get_json(app, "/health/db").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "UNAVAILABLE");
}

#[tokio::test]
async fn test_ingest_status_reports_running_pipeline() {
    let mut config = IngestConfig::default();
    config.cycle_interval_secs = 1;
    config.synthetic.interval_ms = 20;
    config.synthetic.seed = Some(3);

    let pool = init_memory_database().await.unwrap();
    let pipeline = IngestPipeline::spawn_with(
        &config,
        pool.clone(),
        Box::new(SyntheticGenerator::new(config.synthetic.clone())),
        ClassificationEngine::new(&config.classifier, None),
        CancellationToken::new(),
    );
    let app = build_router(AppState::new(pool, Some(pipeline.monitor())));

    tokio::time::sleep(Duration::from_millis(1300)).await;

    let (_, health) = get_json(app.clone(), "/health").await;
    assert_eq!(health["mode"], "synthetic");

    let (status, body) = get_json(app, "/health/ingest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["source"], "synthetic");
    assert_eq!(body["connection"], "Receiving");
    assert!(body["feed"]["received"].as_u64().unwrap() > 0);
    assert!(body["totals"]["cycles"].as_u64().unwrap() >= 1);
    assert!(body["last_cycle"]["cycle"].as_u64().is_some());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_mode_follows_source_kind_not_name() {
    let config = IngestConfig::default();
    let pool = init_memory_database().await.unwrap();
    let pipeline = IngestPipeline::spawn_with(
        &config,
        pool.clone(),
        Box::new(IdleLiveSource),
        ClassificationEngine::new(&config.classifier, None),
        CancellationToken::new(),
    );
    let app = build_router(AppState::new(pool, Some(pipeline.monitor())));

    let (_, health) = get_json(app.clone(), "/health").await;
    assert_eq!(health["mode"], "live");

    let (_, body) = get_json(app, "/health/ingest").await;
    assert_eq!(body["source"], "idle-relay");

    pipeline.shutdown().await;
}
