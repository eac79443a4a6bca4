//! Realtime alert channel with auto-reconnect.
//!
//! Connects to `${ws_url}/alerts`, subscribes with the caller's current
//! filters, and streams parsed alert events through a
//! [`tokio::sync::broadcast`] channel. Connection progress is published on
//! a [`tokio::sync::watch`] channel as a [`ChannelState`].
//!
//! Reconnection uses exponential backoff with jitter and an attempt cap.
//! When the cap is reached (or the server rejects the upgrade with 401/403)
//! the loop stops in [`ChannelState::GaveUp`] so the owner can fall back to
//! polling instead of retrying forever.
//!
//! # Example
//!
//! ```rust,ignore
//! use clinisync_api::realtime::{RealtimeHandle, ReconnectConfig};
//! use clinisync_api::{AlertQuery, Credentials};
//! use tokio_util::sync::CancellationToken;
//!
//! let url = clinisync_api::realtime::alerts_url("wss://clinic.example.org/ws")?;
//! let handle = RealtimeHandle::connect(
//!     url,
//!     &Credentials::bearer(token),
//!     AlertQuery::default(),
//!     ReconnectConfig::default(),
//!     CancellationToken::new(),
//! );
//! let mut rx = handle.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Credentials;
use crate::error::{Error, ErrorKind};
use crate::types::{AlertQuery, AlertResponse};

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── Wire messages ────────────────────────────────────────────────────

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Sent once per connection, right after the handshake.
    Subscribe { filters: AlertQuery },
    /// Sent when filters change on a live connection.
    UpdateFilters { filters: AlertQuery },
}

/// Frames the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    /// An alert was created or changed. Upsert by id.
    AlertUpdate { alert: AlertResponse },
    /// An alert was removed. Delete by id.
    AlertDeleted {
        #[serde(rename = "alertId")]
        alert_id: String,
    },
}

// ── ChannelState ─────────────────────────────────────────────────────

/// Connection lifecycle of the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `delay` before attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Stopped retrying after `attempts` consecutive failures, or after a
    /// terminal (auth) rejection.
    GaveUp { attempts: u32 },
}

impl ChannelState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GaveUp { .. })
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Consecutive failed attempts before giving up.
    /// `None` means retry forever. Default: 10.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(10),
        }
    }
}

/// Build the alerts channel URL from the configured WebSocket base.
pub fn alerts_url(ws_base: &str) -> Result<Url, Error> {
    let mut url = Url::parse(ws_base)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/alerts"));
    Ok(url)
}

// ── RealtimeHandle ───────────────────────────────────────────────────

/// Handle to a running realtime channel.
///
/// Dropping the handle (or calling [`shutdown`](Self::shutdown)) cancels the
/// background task and closes the socket.
pub struct RealtimeHandle {
    event_rx: broadcast::Receiver<Arc<RealtimeEvent>>,
    state_rx: watch::Receiver<ChannelState>,
    filters_tx: watch::Sender<AlertQuery>,
    cancel: CancellationToken,
}

impl RealtimeHandle {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously; watch
    /// [`state`](Self::state) to observe it.
    pub fn connect(
        ws_url: Url,
        credentials: &Credentials,
        filters: AlertQuery,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let (filters_tx, filters_rx) = watch::channel(filters);

        let token = match credentials {
            Credentials::Bearer { token } => Some(token.clone()),
            Credentials::Anonymous => None,
        };

        let channel = Channel {
            url: ws_url,
            token,
            event_tx,
            state_tx,
            filters_rx,
            reconnect,
            cancel: cancel.clone(),
        };
        tokio::spawn(channel.run());

        Self {
            event_rx,
            state_rx,
            filters_tx,
            cancel,
        }
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RealtimeEvent>> {
        self.event_rx.resubscribe()
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state_rx.clone()
    }

    /// Replace the active filters. A live connection sends
    /// `update-filters`; a pending one subscribes with the new value.
    pub fn update_filters(&self, filters: AlertQuery) {
        self.filters_tx.send_if_modified(|current| {
            if *current == filters {
                false
            } else {
                *current = filters;
                true
            }
        });
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct Channel {
    url: Url,
    token: Option<SecretString>,
    event_tx: broadcast::Sender<Arc<RealtimeEvent>>,
    state_tx: watch::Sender<ChannelState>,
    filters_rx: watch::Receiver<AlertQuery>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

impl Channel {
    /// Main loop: connect → read → on close or error, backoff → reconnect.
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.connect_and_read() => result,
            };

            match result {
                // Clean close: the server is healthy, start the ladder over.
                Ok(()) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::info!("realtime channel closed cleanly, reconnecting");
                    attempt = 0;
                }
                Err(e) if e.kind() == ErrorKind::Auth => {
                    tracing::error!(error = %e, "realtime channel rejected, giving up");
                    self.state_tx.send_replace(ChannelState::GaveUp {
                        attempts: attempt + 1,
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "realtime channel error");
                    if let Some(max) = self.reconnect.max_attempts {
                        if attempt >= max {
                            tracing::error!(
                                max_attempts = max,
                                "realtime reconnection limit reached, giving up"
                            );
                            self.state_tx
                                .send_replace(ChannelState::GaveUp { attempts: attempt });
                            return;
                        }
                    }
                }
            }

            let delay = calculate_backoff(attempt, &self.reconnect);
            attempt = attempt.saturating_add(1);
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "waiting before reconnect"
            );
            self.state_tx
                .send_replace(ChannelState::Reconnecting { attempt, delay });

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.state_tx.send_replace(ChannelState::Disconnected);
        tracing::debug!("realtime loop exiting");
    }

    /// Establish a single connection, subscribe, and pump frames until it drops.
    async fn connect_and_read(&mut self) -> Result<(), Error> {
        self.state_tx.send_replace(ChannelState::Connecting);
        tracing::info!(url = %self.url, "connecting realtime channel");

        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| {
                Error::WebSocketConnect(e.to_string())
            })?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(ref token) = self.token {
            request = request.with_header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_connect_error)?;

        self.state_tx.send_replace(ChannelState::Connected);
        tracing::info!("realtime channel connected");

        let (mut write, mut read) = ws_stream.split();

        let filters = self.filters_rx.borrow_and_update().clone();
        send_message(&mut write, &ClientMessage::Subscribe { filters }).await?;

        let mut filters_open = true;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(());
                }
                changed = self.filters_rx.changed(), if filters_open => {
                    if changed.is_err() {
                        filters_open = false;
                        continue;
                    }
                    let filters = self.filters_rx.borrow_and_update().clone();
                    tracing::debug!(?filters, "sending filter update");
                    send_message(&mut write, &ClientMessage::UpdateFilters { filters }).await?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            parse_and_broadcast(&text, &self.event_tx);
                        }
                        Some(Ok(tungstenite::Message::Ping(_))) => {
                            // tungstenite queues the pong; it goes out on the next write/flush
                            tracing::trace!("realtime ping");
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                tracing::info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "realtime close frame received"
                                );
                            } else {
                                tracing::info!("realtime close frame received (no payload)");
                            }
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            return Err(Error::WebSocketConnect(e.to_string()));
                        }
                        None => {
                            tracing::info!("realtime stream ended");
                            return Ok(());
                        }
                        _ => {
                            // Binary, Pong, Frame -- ignore
                        }
                    }
                }
            }
        }
    }
}

async fn send_message<S>(write: &mut S, message: &ClientMessage) -> Result<(), Error>
where
    S: futures_util::Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message)?;
    write
        .send(tungstenite::Message::text(text))
        .await
        .map_err(|e| Error::WebSocketSend(e.to_string()))
}

fn map_connect_error(err: tungstenite::Error) -> Error {
    match err {
        tungstenite::Error::Http(response) => Error::WebSocketRejected {
            status: response.status().as_u16(),
        },
        other => Error::WebSocketConnect(other.to_string()),
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame and broadcast it if it is a known event.
fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<RealtimeEvent>>) {
    let event: RealtimeEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unrecognised realtime frame");
            return;
        }
    };

    // Ignore send errors -- just means no active subscribers right now
    let _ = event_tx.send(Arc::new(event));
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * jitter`
///
/// Jitter is +-25% to spread out reconnection storms from many clients.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config_is_capped() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, Some(10));
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_millis(12_500),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        let huge = calculate_backoff(u32::MAX, &config);
        assert!(huge <= Duration::from_millis(12_500));
    }

    #[test]
    fn first_backoff_has_no_jitter() {
        let config = ReconnectConfig::default();
        assert_eq!(calculate_backoff(0, &config), Duration::from_secs(1));
    }

    #[test]
    fn alerts_url_appends_channel_path() {
        let url = alerts_url("wss://clinic.example.org/ws/").unwrap();
        assert_eq!(url.as_str(), "wss://clinic.example.org/ws/alerts");
        let url = alerts_url("ws://localhost:4000").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:4000/alerts");
    }

    #[test]
    fn subscribe_frame_shape() {
        let msg = ClientMessage::Subscribe {
            filters: AlertQuery {
                severities: vec!["critical".into()],
                ..AlertQuery::default()
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        insta::assert_snapshot!(json, @r#"{"type":"subscribe","filters":{"severities":["critical"]}}"#);
    }

    #[test]
    fn update_filters_frame_shape() {
        let msg = ClientMessage::UpdateFilters {
            filters: AlertQuery::default(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"update-filters","filters":{}}"#);
    }

    #[test]
    fn parse_and_broadcast_alert_update() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "type": "alert-update",
            "alert": {
                "id": "x",
                "title": "Bed 12 telemetry offline",
                "severity": "high",
                "status": "active",
                "category": "system",
                "timestamp": "2026-03-01T08:00:00Z"
            }
        });

        parse_and_broadcast(&raw.to_string(), &tx);

        match &*rx.try_recv().unwrap() {
            RealtimeEvent::AlertUpdate { alert } => assert_eq!(alert.id, "x"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_and_broadcast_alert_deleted() {
        let (tx, mut rx) = broadcast::channel(16);
        parse_and_broadcast(r#"{"type":"alert-deleted","alertId":"x"}"#, &tx);
        assert_eq!(
            *rx.try_recv().unwrap(),
            RealtimeEvent::AlertDeleted {
                alert_id: "x".into()
            }
        );
    }

    #[test]
    fn unknown_and_malformed_frames_are_skipped() {
        let (tx, mut rx) = broadcast::channel::<Arc<RealtimeEvent>>(16);

        parse_and_broadcast("not json at all", &tx);
        parse_and_broadcast(r#"{"type":"heartbeat"}"#, &tx);
        parse_and_broadcast(r#"{"type":"alert-update"}"#, &tx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_state_helpers() {
        assert!(ChannelState::Connected.is_connected());
        assert!(ChannelState::GaveUp { attempts: 3 }.is_terminal());
        assert!(
            !ChannelState::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .is_terminal()
        );
    }
}
