//! Live feed connector tests against a local WebSocket server

use futures::{SinkExt, StreamExt};
use logitrack_common::config::{FeedConfig, IngestConfig};
use logitrack_common::db::{init_memory_database, queries};
use logitrack_common::BoundingBox;
use logitrack_ingest::feed::{
    AisStreamConnector, ConnectionState, ReportQueue, ReportSource, SourceContext,
};
use logitrack_ingest::scheduler::CycleScheduler;
use logitrack_ingest::services::ClassificationEngine;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

type ServerSocket = WebSocketStream<TcpStream>;

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Read the client's subscription request
async fn read_subscription(ws: &mut ServerSocket) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

/// Hold the connection until the client goes away
async fn hold(mut ws: ServerSocket) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn position(mmsi: u64, lat: f64, lon: f64, nav_status: u8) -> Message {
    Message::Text(
        json!({
            "MessageType": "PositionReport",
            "MetaData": {
                "MMSI": mmsi,
                "ShipName": "TEST VESSEL",
                "latitude": lat,
                "longitude": lon,
                "time_utc": "2025-06-01 08:00:00.000000000 +0000 UTC"
            },
            "Message": {
                "PositionReport": {
                    "Latitude": lat,
                    "Longitude": lon,
                    "NavigationalStatus": nav_status,
                    "Sog": 12.5,
                    "UserID": mmsi
                }
            }
        })
        .to_string(),
    )
}

fn feed_config(url: String) -> FeedConfig {
    FeedConfig {
        url,
        api_key: Some("test-key".to_string()),
        bounding_boxes: vec![BoundingBox::from([[0.0, 100.0], [10.0, 110.0]])],
        receive_timeout_secs: 5,
        subscribe_ack_timeout_secs: 1,
        backoff_initial_ms: 10,
        backoff_max_ms: 50,
    }
}

struct Harness {
    queue: ReportQueue,
    ctx: SourceContext,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn start(config: FeedConfig) -> Harness {
    let queue = ReportQueue::new(64);
    let cancel = CancellationToken::new();
    let ctx = SourceContext::new(queue.clone(), cancel.clone());
    let task = tokio::spawn(Box::new(AisStreamConnector::new(config)).run(ctx.clone()));
    Harness {
        queue,
        ctx,
        cancel,
        task,
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_subscribes_and_publishes_positions() {
    let (listener, url) = listener().await;
    let harness = start(feed_config(url));

    let mut ws = accept(&listener).await;
    let subscription = read_subscription(&mut ws).await;
    assert_eq!(subscription["APIKey"], "test-key");
    assert_eq!(subscription["BoundingBoxes"], json!([[[0.0, 100.0], [10.0, 110.0]]]));
    assert_eq!(subscription["FilterMessageTypes"], json!(["PositionReport"]));

    ws.send(position(111, 1.0, 101.0, 0)).await.unwrap();
    ws.send(Message::Text("{ definitely not json".to_string())).await.unwrap();
    ws.send(Message::Text(json!({"MessageType": "ShipStaticData", "Message": {}}).to_string()))
        .await
        .unwrap();
    ws.send(Message::Binary(position(222, 2.0, 102.0, 1).into_data())).await.unwrap();

    wait_for(|| harness.queue.len() == 2 && harness.ctx.metrics.snapshot().malformed == 1).await;
    assert_eq!(*harness.ctx.subscribe_state().borrow(), ConnectionState::Receiving);

    let reports = harness.queue.drain();
    assert_eq!(reports[0].external_id, "111");
    assert_eq!(reports[1].external_id, "222");
    assert_eq!(reports[1].raw_status_text, "At anchor, 12.5 kn");

    let server = tokio::spawn(hold(ws));
    harness.cancel.cancel();
    harness.task.await.unwrap();
    assert_eq!(*harness.ctx.subscribe_state().borrow(), ConnectionState::Disconnected);
    server.await.unwrap();

    let metrics = harness.ctx.metrics.snapshot();
    assert_eq!(metrics.received, 2);
    assert_eq!(metrics.sessions, 1);
    assert_eq!(metrics.reconnects, 0);
}

#[tokio::test]
async fn test_ack_timeout_triggers_reconnect() {
    let (listener, url) = listener().await;
    let harness = start(feed_config(url));

    // First connection: accept the subscription, then stay silent
    let mut silent = accept(&listener).await;
    read_subscription(&mut silent).await;
    let silent_task = tokio::spawn(hold(silent));

    let mut ws = accept(&listener).await;
    read_subscription(&mut ws).await;
    ws.send(position(333, 3.0, 103.0, 0)).await.unwrap();

    wait_for(|| harness.queue.len() == 1).await;
    let metrics = harness.ctx.metrics.snapshot();
    assert!(metrics.reconnects >= 1);
    assert_eq!(metrics.sessions, 1);

    let server = tokio::spawn(hold(ws));
    harness.cancel.cancel();
    harness.task.await.unwrap();
    server.await.unwrap();
    silent_task.abort();
}

#[tokio::test]
async fn test_error_frame_is_rejection() {
    let (listener, url) = listener().await;
    let harness = start(feed_config(url));

    let mut rejected = accept(&listener).await;
    read_subscription(&mut rejected).await;
    rejected
        .send(Message::Text(json!({"error": "Api Key Is Not Valid"}).to_string()))
        .await
        .unwrap();
    let rejected_task = tokio::spawn(hold(rejected));

    let mut ws = accept(&listener).await;
    read_subscription(&mut ws).await;
    ws.send(position(444, 4.0, 104.0, 0)).await.unwrap();

    wait_for(|| harness.queue.len() == 1).await;
    assert!(harness.ctx.metrics.snapshot().reconnects >= 1);
    assert_eq!(harness.queue.drain()[0].external_id, "444");

    let server = tokio::spawn(hold(ws));
    harness.cancel.cancel();
    harness.task.await.unwrap();
    server.await.unwrap();
    rejected_task.abort();
}

#[tokio::test]
async fn test_reconnect_resumes_without_duplicates() {
    let (listener, url) = listener().await;
    let mut config = IngestConfig::default();
    config.feed = feed_config(url);
    let harness = start(config.feed.clone());

    let pool = init_memory_database().await.unwrap();
    let engine = ClassificationEngine::new(&config.classifier, None);
    let mut scheduler = CycleScheduler::new(&config, pool.clone(), harness.queue.clone(), engine);

    let mut first = accept(&listener).await;
    read_subscription(&mut first).await;
    first.send(position(555, 5.0, 105.0, 0)).await.unwrap();
    first.send(position(555, 5.5, 105.0, 0)).await.unwrap();
    wait_for(|| harness.queue.len() == 2).await;

    let before = scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(before.accepted, 2);
    assert_eq!(queries::count_events(&pool).await.unwrap(), 2);

    first.close(None).await.unwrap();
    drop(first);

    // The new session replays the last position before moving on
    let mut second = accept(&listener).await;
    read_subscription(&mut second).await;
    second.send(position(555, 5.5, 105.0, 0)).await.unwrap();
    second.send(position(555, 6.0, 105.0, 0)).await.unwrap();
    wait_for(|| harness.queue.len() == 2).await;

    let metrics = harness.ctx.metrics.snapshot();
    assert_eq!(metrics.sessions, 2);
    assert!(metrics.reconnects >= 1);

    let after = scheduler.run_cycle(&CancellationToken::new()).await;
    assert_eq!(after.drained, 2);
    assert_eq!(after.deduplicated, 1);
    assert_eq!(after.accepted, 1);

    let events = queries::events_for_shipment(&pool, "555").await.unwrap();
    let latitudes: Vec<f64> = events.iter().map(|e| e.position.latitude).collect();
    assert_eq!(latitudes, vec![5.0, 5.5, 6.0]);

    let server = tokio::spawn(hold(second));
    harness.cancel.cancel();
    harness.task.await.unwrap();
    server.await.unwrap();
}
