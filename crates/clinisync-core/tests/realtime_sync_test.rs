// End-to-end sync: REST seed from a mock back end, live changes from a
// local WebSocket server, and the switch from realtime to polling.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clinisync_core::{
    AlertFilter, AlertSeverity, AlertSync, AuthCredentials, ChannelState, ReconnectConfig,
    SyncConfig, SyncMode,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn alert_json(id: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Alert {id}"),
        "severity": "high",
        "status": "active",
        "category": "equipment",
        "timestamp": "2026-03-01T08:00:00Z",
        "version": 1
    })
}

/// Accepts one connection, forwards client frames to `frames_tx`, and
/// writes whatever arrives on `push_rx`.
async fn ws_server(
    listener: TcpListener,
    frames_tx: mpsc::UnboundedSender<Value>,
    mut push_rx: mpsc::UnboundedReceiver<String>,
) {
    let (stream, _) = listener.accept().await.unwrap();
    let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = frames_tx.send(serde_json::from_str(&text).unwrap());
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            push = push_rx.recv() => match push {
                Some(text) => {
                    if write.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn next_frame(frames_rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("timed out waiting for a client frame")
        .unwrap()
}

async fn wait_for_ids(sync: &AlertSync, expected: &[&str]) {
    let mut stream = sync.alerts();
    let ids = |s: &clinisync_core::EntityStream<clinisync_core::Alert>| {
        s.current()
            .iter()
            .map(|a| a.id.to_string())
            .collect::<Vec<_>>()
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while ids(&stream) != expected {
            stream.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("store never reached {expected:?}, has {:?}", ids(&stream)));
}

async fn alert_list_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/monitoring/alerts")
        .count()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_changes_then_fallback_to_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/monitoring/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            alert_json("a"),
            alert_json("b"),
            alert_json("c"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(ws_server(listener, frames_tx, push_rx));

    let mut config = SyncConfig::new(server.uri().parse().unwrap(), AuthCredentials::Anonymous);
    config.ws_url = Some(format!("ws://{addr}").parse().unwrap());
    config.settings.realtime_enabled = true;
    config.settings.auto_refresh = true;
    config.settings.refresh_interval = Duration::from_secs(1);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        max_attempts: Some(3),
    };
    let sync = AlertSync::new(config);
    sync.connect().await.unwrap();
    wait_for_ids(&sync, &["a", "b", "c"]).await;

    // Subscription goes out with the (empty) active filter.
    let subscribe = next_frame(&mut frames_rx).await;
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(*sync.sync_mode().borrow(), SyncMode::Socket);

    let mut channel = sync.channel_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        channel.wait_for(|s| *s == ChannelState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    // 3 -> 4: a new alert lands at the head.
    push_tx
        .send(json!({"type": "alert-update", "alert": alert_json("x")}).to_string())
        .unwrap();
    wait_for_ids(&sync, &["x", "a", "b", "c"]).await;

    // 4 -> 3: the same alert is deleted.
    push_tx
        .send(json!({"type": "alert-deleted", "alertId": "x"}).to_string())
        .unwrap();
    wait_for_ids(&sync, &["a", "b", "c"]).await;

    // A filter change is pushed to the open subscription.
    sync.set_filters(AlertFilter {
        severities: [AlertSeverity::High].into(),
        ..AlertFilter::default()
    })
    .await
    .unwrap();
    let update = next_frame(&mut frames_rx).await;
    assert_eq!(
        update,
        json!({"type": "update-filters", "filters": {"severities": ["high"]}})
    );

    // Realtime off: the socket closes and polling takes over.
    sync.set_realtime(false);
    let mut mode = sync.sync_mode();
    tokio::time::timeout(Duration::from_secs(2), mode.wait_for(|m| *m == SyncMode::Polling))
        .await
        .unwrap()
        .unwrap();

    let _ = push_tx.send(json!({"type": "alert-update", "alert": alert_json("late")}).to_string());

    let before = alert_list_requests(&server).await;
    tokio::time::timeout(Duration::from_millis(1800), async {
        while alert_list_requests(&server).await <= before {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("no poll within the refresh interval");

    assert!(
        sync.alerts_snapshot()
            .iter()
            .all(|a| a.id.as_str() != "late")
    );
    assert_eq!(*sync.channel_state().borrow(), ChannelState::Disconnected);

    sync.disconnect().await;
}

#[tokio::test]
async fn missing_realtime_url_means_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/monitoring/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([alert_json("a")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let mut config = SyncConfig::new(server.uri().parse().unwrap(), AuthCredentials::Anonymous);
    config.settings.refresh_interval = Duration::from_secs(1);
    let sync = AlertSync::new(config);
    sync.connect().await.unwrap();

    let mut mode = sync.sync_mode();
    tokio::time::timeout(Duration::from_secs(2), mode.wait_for(|m| *m == SyncMode::Polling))
        .await
        .unwrap()
        .unwrap();

    sync.disconnect().await;
    assert_eq!(*sync.sync_mode().borrow(), SyncMode::Idle);
    // Data survives a disconnect.
    assert_eq!(sync.alerts_snapshot().len(), 1);
}
