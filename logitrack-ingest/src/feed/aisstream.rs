//! AISStream live position feed
//!
//! Subscribes to position reports for the configured bounding boxes and
//! forwards each one as a `RawReport`. The session is re-established with
//! backoff after any failure; only cancellation ends `run`.

use super::{
    Backoff, ConnectionState, FeedError, NavHint, NavStatus, RawReport, ReportSource,
    SourceContext, SourceMode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use logitrack_common::config::FeedConfig;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Speed over ground at or above this value means "not available"
const SOG_NOT_AVAILABLE: f64 = 102.2;

/// Upper bound on the close handshake during shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Position(RawReport),
    /// Valid message of a type we do not consume
    Ignored,
    /// Server-side error (e.g. bad API key)
    Error(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "MessageType")]
    message_type: Option<String>,
    #[serde(rename = "MetaData")]
    meta: Option<MetaData>,
    #[serde(rename = "Message")]
    message: Option<MessageBody>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    #[serde(rename = "MMSI")]
    mmsi: Option<u64>,
    #[serde(rename = "ShipName")]
    ship_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    time_utc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(rename = "PositionReport")]
    position_report: Option<PositionReport>,
}

#[derive(Debug, Deserialize)]
struct PositionReport {
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "NavigationalStatus")]
    navigational_status: Option<u8>,
    #[serde(rename = "Sog")]
    sog: Option<f64>,
    #[serde(rename = "UserID")]
    user_id: Option<u64>,
}

/// Decode one inbound payload
///
/// `received_at` stands in for the observation time when the frame carries
/// no usable timestamp.
pub fn parse_frame(payload: &[u8], received_at: DateTime<Utc>) -> Result<Frame, FeedError> {
    let envelope: Envelope =
        serde_json::from_slice(payload).map_err(|e| FeedError::Malformed(e.to_string()))?;

    if let Some(error) = envelope.error {
        return Ok(Frame::Error(error));
    }

    match envelope.message_type.as_deref() {
        Some("PositionReport") => {}
        Some(_) => return Ok(Frame::Ignored),
        None => return Err(FeedError::Malformed("missing MessageType".to_string())),
    }

    let position = envelope
        .message
        .and_then(|m| m.position_report)
        .ok_or_else(|| FeedError::Malformed("missing PositionReport body".to_string()))?;

    let mmsi = envelope
        .meta
        .as_ref()
        .and_then(|m| m.mmsi)
        .or(position.user_id)
        .ok_or_else(|| FeedError::Malformed("missing MMSI".to_string()))?;

    let latitude = position
        .latitude
        .or_else(|| envelope.meta.as_ref().and_then(|m| m.latitude))
        .ok_or_else(|| FeedError::Malformed("missing latitude".to_string()))?;
    let longitude = position
        .longitude
        .or_else(|| envelope.meta.as_ref().and_then(|m| m.longitude))
        .ok_or_else(|| FeedError::Malformed("missing longitude".to_string()))?;

    let observed_at = envelope
        .meta
        .as_ref()
        .and_then(|m| m.time_utc.as_deref())
        .and_then(parse_time_utc)
        .unwrap_or(received_at);

    let status = position
        .navigational_status
        .map(NavStatus::from_code)
        .unwrap_or(NavStatus::Undefined);
    let speed_knots = position.sog.filter(|sog| *sog >= 0.0 && *sog < SOG_NOT_AVAILABLE);

    let raw_status_text = match speed_knots {
        Some(sog) => format!("{}, {:.1} kn", status.label(), sog),
        None => status.label().to_string(),
    };

    if let Some(name) = envelope.meta.as_ref().and_then(|m| m.ship_name.as_deref()) {
        debug!(mmsi, ship = name.trim(), "Position report");
    }

    Ok(Frame::Position(RawReport {
        external_id: mmsi.to_string(),
        raw_status_text,
        nav_hint: Some(NavHint { status, speed_knots }),
        latitude,
        longitude,
        observed_at,
        location_label: None,
        origin: None,
        destination: None,
    }))
}

/// `2024-03-01 12:00:00.123456789 +0000 UTC`, or RFC 3339
fn parse_time_utc(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    let without_zone_name = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);
    DateTime::parse_from_str(without_zone_name, "%Y-%m-%d %H:%M:%S%.f %z")
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

pub struct AisStreamConnector {
    config: FeedConfig,
    backoff: Backoff,
}

impl AisStreamConnector {
    pub fn new(config: FeedConfig) -> Self {
        let backoff = Backoff::from_millis(config.backoff_initial_ms, config.backoff_max_ms);
        Self { config, backoff }
    }

    /// Subscription request sent right after the socket opens
    pub fn subscription_message(&self) -> Result<String, FeedError> {
        let body = serde_json::json!({
            "APIKey": self.config.api_key.clone().unwrap_or_default(),
            "BoundingBoxes": self.config.bounding_boxes,
            "FilterMessageTypes": ["PositionReport"],
        });
        serde_json::to_string(&body).map_err(|e| FeedError::Encode(e.to_string()))
    }

    /// One connection lifetime; `Ok` only when cancelled
    async fn session(&mut self, ctx: &SourceContext) -> Result<(), FeedError> {
        let connect = tokio::time::timeout(
            self.config.subscribe_ack_timeout(),
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        );
        let (mut ws, _response) = tokio::select! {
            _ = ctx.cancel.cancelled() => return Ok(()),
            result = connect => result
                .map_err(|_| FeedError::Connect("connect timed out".to_string()))?
                .map_err(|e| FeedError::Connect(e.to_string()))?,
        };

        ws.send(Message::Text(self.subscription_message()?))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        ctx.set_state(ConnectionState::Subscribed);

        let ack_timeout = self.config.subscribe_ack_timeout();
        let first = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                close(ws, ctx).await;
                return Ok(());
            }
            result = tokio::time::timeout(ack_timeout, next_payload(&mut ws)) => {
                result.map_err(|_| FeedError::SubscribeAckTimeout(ack_timeout))??
            }
        };

        // Any first frame other than an error counts as acceptance
        if let Ok(Frame::Error(message)) = parse_frame(&first, Utc::now()) {
            return Err(FeedError::SubscriptionRejected(message));
        }

        self.backoff.reset();
        ctx.metrics.record_session();
        ctx.set_state(ConnectionState::Receiving);
        info!(url = %self.config.url, boxes = self.config.bounding_boxes.len(), "Feed subscribed");
        handle_payload(&first, ctx)?;

        let receive_timeout = self.config.receive_timeout();
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    close(ws, ctx).await;
                    return Ok(());
                }
                result = tokio::time::timeout(receive_timeout, next_payload(&mut ws)) => {
                    let payload = result.map_err(|_| FeedError::ReceiveTimeout(receive_timeout))??;
                    handle_payload(&payload, ctx)?;
                }
            }
        }
    }
}

/// Next text or binary payload; control frames are skipped
async fn next_payload(ws: &mut WsStream) -> Result<Vec<u8>, FeedError> {
    loop {
        match ws.next().await {
            None => return Err(FeedError::ClosedByPeer),
            Some(Err(e)) => return Err(FeedError::Transport(e.to_string())),
            Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
            Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
            Some(Ok(Message::Close(_))) => return Err(FeedError::ClosedByPeer),
            Some(Ok(_)) => continue,
        }
    }
}

/// Publish a position, skip other types, count malformed payloads
fn handle_payload(payload: &[u8], ctx: &SourceContext) -> Result<(), FeedError> {
    match parse_frame(payload, Utc::now()) {
        Ok(Frame::Position(report)) => ctx.publish(report),
        Ok(Frame::Ignored) => {}
        Ok(Frame::Error(message)) => return Err(FeedError::SubscriptionRejected(message)),
        Err(e) => {
            ctx.metrics.record_malformed();
            debug!(error = %e, "Dropped malformed feed message");
        }
    }
    Ok(())
}

async fn close(mut ws: WsStream, ctx: &SourceContext) {
    ctx.set_state(ConnectionState::Closing);
    if tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await.is_err() {
        debug!("Close handshake timed out");
    }
}

#[async_trait]
impl ReportSource for AisStreamConnector {
    fn name(&self) -> &'static str {
        "aisstream"
    }

    fn mode(&self) -> SourceMode {
        SourceMode::Live
    }

    async fn run(mut self: Box<Self>, ctx: SourceContext) {
        info!(url = %self.config.url, "Live feed connector started");

        while !ctx.cancel.is_cancelled() {
            ctx.set_state(ConnectionState::Connecting);
            match self.session(&ctx).await {
                Ok(()) => break,
                Err(e) => {
                    ctx.set_state(ConnectionState::Reconnecting);
                    ctx.metrics.record_reconnect();
                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = self.backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Feed connection lost, reconnecting"
                    );
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        // No-op when the session already closed its connection
        ctx.set_state(ConnectionState::Closing);
        ctx.set_state(ConnectionState::Disconnected);
        info!("Live feed connector stopped");
    }
}
