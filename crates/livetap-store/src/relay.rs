//! Cross-process live relay.
//!
//! Collector processes publish [`LiveMessage`]s to a per-room Redis
//! channel; the API server pattern-subscribes to all rooms and hands each
//! message to its fan-out hub.

use async_trait::async_trait;
use futures::StreamExt;
use livetap_core::{LiveMessage, RoomId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::RelayError;

/// Channel pattern covering every room.
pub const LIVE_CHANNEL_PATTERN: &str = "broadcast:*:live";

/// Channel a room's live messages are published on.
pub fn live_channel(room_id: &RoomId) -> String {
    format!("broadcast:{room_id}:live")
}

/// Sink for live messages leaving a collector.
#[async_trait]
pub trait LivePublisher: Send + Sync {
    /// Publish one message. Delivery is best-effort.
    async fn publish(&self, message: &LiveMessage) -> Result<(), RelayError>;
}

/// Publishes to Redis pub/sub.
#[derive(Clone)]
pub struct RedisLivePublisher {
    conn: ConnectionManager,
}

impl RedisLivePublisher {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl LivePublisher for RedisLivePublisher {
    async fn publish(&self, message: &LiveMessage) -> Result<(), RelayError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(live_channel(message.room_id()), payload).await?;
        debug!(room_id = %message.room_id(), kind = message.kind(), receivers, "live message published");
        Ok(())
    }
}

/// Pattern subscription over every room's live channel.
pub struct RedisLiveSubscriber {
    client: redis::Client,
}

impl RedisLiveSubscriber {
    /// Prepare a subscriber for Redis at `url`. Connects lazily in [`Self::run`].
    pub fn new(url: &str) -> Result<Self, RelayError> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }

    /// Deliver messages to `on_message` until `cancel` fires or the stream closes.
    ///
    /// Undecodable payloads are logged and skipped.
    pub async fn run<F>(&self, cancel: CancellationToken, mut on_message: F) -> Result<(), RelayError>
    where
        F: FnMut(LiveMessage) + Send,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(LIVE_CHANNEL_PATTERN).await?;
        info!(pattern = LIVE_CHANNEL_PATTERN, "live relay subscribed");

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Err(RelayError::Closed);
                    };
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(channel = msg.get_channel_name(), error = %e, "unreadable relay payload");
                            continue;
                        }
                    };
                    match decode_message(&payload) {
                        Ok(message) => on_message(message),
                        Err(e) => {
                            warn!(channel = msg.get_channel_name(), error = %e, "undecodable relay message");
                        }
                    }
                }
            }
        }
    }
}

/// Parse a relayed payload.
pub fn decode_message(payload: &str) -> Result<LiveMessage, RelayError> {
    Ok(serde_json::from_str(payload)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use livetap_core::{CollectorStatus, SessionId};

    #[test]
    fn channel_names() {
        assert_eq!(live_channel(&RoomId::from("abc")), "broadcast:abc:live");
    }

    #[test]
    fn decode_round_trip() {
        let msg = LiveMessage::status(
            RoomId::from("abc"),
            SessionId::from("s1"),
            CollectorStatus::Connected,
            None,
        );
        let payload = serde_json::to_string(&msg).unwrap();
        assert_eq!(decode_message(&payload).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_message("nope"), Err(RelayError::Serde(_))));
    }
}
