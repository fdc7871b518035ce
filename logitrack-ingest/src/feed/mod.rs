//! Report sources
//!
//! A source produces `RawReport`s into the bounded `ReportQueue` until it is
//! cancelled. Two implementations exist:
//! - `AisStreamConnector`: live WebSocket position stream
//! - `SyntheticGenerator`: timer-driven offline substitute
//!
//! Downstream components only ever see the queue, so they are mode-agnostic.

pub mod aisstream;
pub mod backoff;
pub mod queue;
pub mod synthetic;

pub use aisstream::AisStreamConnector;
pub use backoff::Backoff;
pub use queue::ReportQueue;
pub use synthetic::SyntheticGenerator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logitrack_common::config::IngestConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// AIS navigational status (ITU-R M.1371 codes 0-8; everything else undefined)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NavStatus {
    UnderWayUsingEngine,
    AtAnchor,
    NotUnderCommand,
    RestrictedManoeuvrability,
    ConstrainedByDraught,
    Moored,
    Aground,
    Fishing,
    UnderWaySailing,
    Undefined,
}

impl NavStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => NavStatus::UnderWayUsingEngine,
            1 => NavStatus::AtAnchor,
            2 => NavStatus::NotUnderCommand,
            3 => NavStatus::RestrictedManoeuvrability,
            4 => NavStatus::ConstrainedByDraught,
            5 => NavStatus::Moored,
            6 => NavStatus::Aground,
            7 => NavStatus::Fishing,
            8 => NavStatus::UnderWaySailing,
            _ => NavStatus::Undefined,
        }
    }

    /// Human-readable label, used as the raw status text of live reports
    pub fn label(&self) -> &'static str {
        match self {
            NavStatus::UnderWayUsingEngine => "Under way using engine",
            NavStatus::AtAnchor => "At anchor",
            NavStatus::NotUnderCommand => "Not under command",
            NavStatus::RestrictedManoeuvrability => "Restricted manoeuvrability",
            NavStatus::ConstrainedByDraught => "Constrained by her draught",
            NavStatus::Moored => "Moored",
            NavStatus::Aground => "Aground",
            NavStatus::Fishing => "Engaged in fishing",
            NavStatus::UnderWaySailing => "Under way sailing",
            NavStatus::Undefined => "Status not defined",
        }
    }
}

/// Structured navigational hint accompanying a report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NavHint {
    pub status: NavStatus,
    pub speed_knots: Option<f64>,
}

impl NavHint {
    pub fn new(status: NavStatus) -> Self {
        Self {
            status,
            speed_knots: None,
        }
    }
}

/// One position/status report as produced by a source
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub external_id: String,
    pub raw_status_text: String,
    pub nav_hint: Option<NavHint>,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
    /// Free-text place name; derived from coordinates when absent
    pub location_label: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

/// Where a source's reports come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Live,
    Synthetic,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Live => "live",
            SourceMode::Synthetic => "synthetic",
        }
    }
}

/// Live connection lifecycle
///
/// `Disconnected → Connecting → Subscribed → Receiving`, with
/// `Reconnecting` on failure and `Closing` on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
    Reconnecting,
    Closing,
}

/// Source-side counters, shared with the scheduler and health endpoint
#[derive(Debug, Default)]
pub struct FeedMetrics {
    received: AtomicU64,
    malformed: AtomicU64,
    sessions: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of `FeedMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedMetricsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub sessions: u64,
    pub reconnects: u64,
}

impl FeedMetrics {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FeedMetricsSnapshot {
        FeedMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Feed connector errors; every variant leads to a reconnect, never a crash
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No message received within {0:?}")]
    ReceiveTimeout(Duration),

    #[error("Subscription not acknowledged within {0:?}")]
    SubscribeAckTimeout(Duration),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Connection closed by peer")]
    ClosedByPeer,

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Encode error: {0}")]
    Encode(String),
}

/// Everything a running source needs from its owner
#[derive(Clone)]
pub struct SourceContext {
    pub queue: ReportQueue,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub metrics: Arc<FeedMetrics>,
    pub cancel: CancellationToken,
}

impl SourceContext {
    pub fn new(queue: ReportQueue, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            queue,
            state: Arc::new(state),
            metrics: Arc::new(FeedMetrics::default()),
            cancel,
        }
    }

    pub fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                tracing::debug!(from = ?current, to = ?next, "Feed state transition");
                *current = next;
                true
            }
        });
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Hand a report to the scheduler; evicts the oldest buffered report when full
    pub fn publish(&self, report: RawReport) {
        self.metrics.record_received();
        if self.queue.push(report) {
            tracing::debug!("Report queue full, dropped oldest report");
        }
    }
}

/// A producer of raw reports (live feed or synthetic generator)
#[async_trait]
pub trait ReportSource: Send {
    /// Source name for logging
    fn name(&self) -> &'static str;

    fn mode(&self) -> SourceMode;

    /// Produce reports into `ctx.queue` until `ctx.cancel` fires
    ///
    /// Must not return early on transport errors; the source owns its own
    /// recovery. Returns once shutdown is complete and the connection, if
    /// any, is released.
    async fn run(self: Box<Self>, ctx: SourceContext);
}

/// Select the source for the configured mode (read once at startup)
pub fn build_source(config: &IngestConfig) -> Box<dyn ReportSource> {
    if config.live_mode {
        Box::new(AisStreamConnector::new(config.feed.clone()))
    } else {
        Box::new(SyntheticGenerator::new(config.synthetic.clone()))
    }
}
