//! WebSocket subscription sessions.
//!
//! A session registers with the [`FanoutHub`], sends
//! `connection.established`, then forwards hub messages until the client
//! leaves, the hub evicts it, keepalive lapses, or the server shuts down.
//! Client frames carry no payload; any frame counts as keepalive.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use livetap_core::ConnectionId;
use metrics::{counter, histogram};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::hub::{FanoutHub, SubscriptionKey};
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL};

/// Ping cadence and the silence after which a client is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Keepalive {
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence tolerated before disconnecting.
    pub pong_timeout: Duration,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client closed or the socket failed.
    ClientGone,
    /// Hub dropped the subscriber after a failed delivery.
    Evicted,
    /// No keepalive within the timeout.
    TimedOut,
    /// Server shutdown.
    Shutdown,
}

/// First frame sent on every subscription.
pub fn established_message(connection_id: &ConnectionId, key: &SubscriptionKey) -> Value {
    json!({
        "type": "connection.established",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": {
            "connection_id": connection_id,
            "room_id": key.room_id(),
        },
    })
}

/// Serve one subscriber until it ends.
#[instrument(skip_all, fields(key = ?key))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<FanoutHub>,
    key: SubscriptionKey,
    keepalive: Keepalive,
    shutdown: CancellationToken,
) -> SessionEnd {
    let (subscriber, mut rx) = hub.subscribe(key);
    let evicted = subscriber.evicted();
    let (mut ws_tx, mut ws_rx) = ws.split();
    let connected_at = std::time::Instant::now();

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(connection_id = %subscriber.id, "subscriber connected");

    let hello = established_message(&subscriber.id, &subscriber.key).to_string();
    let mut end = if ws_tx.send(Message::Text(hello.into())).await.is_err() {
        Some(SessionEnd::ClientGone)
    } else {
        None
    };

    let mut ping = tokio::time::interval(keepalive.ping_interval);
    let _ = ping.tick().await;

    while end.is_none() {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => end = Some(SessionEnd::Shutdown),
            () = evicted.cancelled() => end = Some(SessionEnd::Evicted),
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if ws_tx.send(Message::Text(payload.as_str().to_owned().into())).await.is_err() {
                            end = Some(SessionEnd::ClientGone);
                        }
                    }
                    None => end = Some(SessionEnd::Evicted),
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_)) | Err(_)) | None => end = Some(SessionEnd::ClientGone),
                Some(Ok(_)) => subscriber.mark_alive(),
            },
            _ = ping.tick() => {
                if subscriber.silence() > keepalive.pong_timeout {
                    warn!(connection_id = %subscriber.id, timeout = ?keepalive.pong_timeout, "subscriber unresponsive, disconnecting");
                    end = Some(SessionEnd::TimedOut);
                } else if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    end = Some(SessionEnd::ClientGone);
                }
            }
        }
    }

    let end = end.unwrap_or(SessionEnd::ClientGone);
    if end != SessionEnd::ClientGone {
        let _ = ws_tx.send(Message::Close(None)).await;
    }
    let _ = hub.unsubscribe(&subscriber);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connected_at.elapsed().as_secs_f64());
    debug!(connection_id = %subscriber.id, ?end, "subscriber disconnected");
    end
}
