//! Redis-backed session buffer.
//!
//! Each session is a Redis list under [`buffer_key`]. Appends are `RPUSH`
//! of the event's JSON, so the list survives restarts of the collector.

use async_trait::async_trait;
use chrono::Utc;
use livetap_core::{NormalizedEvent, RoomId, SessionId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use super::{SessionBuffer, buffer_key};
use crate::errors::BufferError;

/// Buffer stored in Redis lists.
#[derive(Clone)]
pub struct RedisSessionBuffer {
    conn: ConnectionManager,
}

impl RedisSessionBuffer {
    /// Connect to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self, BufferError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!("session buffer connected to redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

/// Decode buffer entries in order. An undecodable entry takes the timestamp
/// of the previous decoded entry (or the next one, when it leads the list),
/// so archive ordering by timestamp keeps it where it was buffered.
fn decode_entries(key: &str, raw: Vec<String>) -> Vec<NormalizedEvent> {
    let decoded: Vec<Result<NormalizedEvent, String>> = raw
        .into_iter()
        .map(|entry| {
            serde_json::from_str(&entry).map_err(|e| {
                warn!(key, error = %e, "undecodable buffer entry, keeping raw text");
                entry
            })
        })
        .collect();

    let mut last = decoded
        .iter()
        .find_map(|d| d.as_ref().ok())
        .map_or_else(Utc::now, |event| event.timestamp);
    decoded
        .into_iter()
        .map(|d| match d {
            Ok(event) => {
                last = event.timestamp;
                event
            }
            Err(entry) => NormalizedEvent::unparseable(&entry, last),
        })
        .collect()
}

#[async_trait]
impl SessionBuffer for RedisSessionBuffer {
    async fn append(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        event: &NormalizedEvent,
    ) -> Result<(), BufferError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(buffer_key(room_id, session_id), payload).await?;
        Ok(())
    }

    async fn snapshot(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Vec<NormalizedEvent>, BufferError> {
        let key = buffer_key(room_id, session_id);
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        Ok(decode_entries(&key, raw))
    }

    async fn clear(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        count: usize,
    ) -> Result<(), BufferError> {
        if count == 0 {
            return Ok(());
        }
        let start = isize::try_from(count).unwrap_or(isize::MAX);
        let mut conn = self.conn.clone();
        // LTRIM to an empty range deletes the key.
        let _: () = conn.ltrim(buffer_key(room_id, session_id), start, -1).await?;
        Ok(())
    }

    async fn len(&self, room_id: &RoomId, session_id: &SessionId) -> Result<usize, BufferError> {
        let mut conn = self.conn.clone();
        let n: usize = conn.llen(buffer_key(room_id, session_id)).await?;
        Ok(n)
    }

    async fn drain(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Vec<NormalizedEvent>, BufferError> {
        let key = buffer_key(room_id, session_id);
        let mut conn = self.conn.clone();
        let (raw, _deleted): (Vec<String>, i64) = redis::pipe()
            .atomic()
            .lrange(&key, 0, -1)
            .del(&key)
            .query_async(&mut conn)
            .await?;
        Ok(decode_entries(&key, raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn undecodable_entries_keep_their_position_in_time() {
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 5).unwrap();
        let entry = |at| serde_json::to_string(&NormalizedEvent::new("like", at, json!({}))).unwrap();

        let events = decode_entries(
            "k",
            vec!["lead".into(), entry(t1), "middle".into(), entry(t2)],
        );

        let stamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![t1, t1, t1, t2]);
        assert_eq!(events[0].data, json!("lead"));
        assert_eq!(events[2].data, json!("middle"));
    }

    #[test]
    fn undecodable_entries_are_kept() {
        let good = serde_json::to_string(&NormalizedEvent::new("like", Utc::now(), json!({}))).unwrap();
        let events = decode_entries("k", vec![good, "garbage".into()]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "like");
        assert_eq!(events[1].event_type, livetap_core::events::UNPARSEABLE_EVENT_TYPE);
    }

    #[tokio::test]
    #[ignore = "requires LIVETAP_TEST_REDIS_URL"]
    async fn redis_round_trip() {
        let Ok(url) = std::env::var("LIVETAP_TEST_REDIS_URL") else {
            return;
        };
        let buffer = RedisSessionBuffer::connect(&url).await.unwrap();
        let room = RoomId::from("test-room");
        let session = SessionId::new();

        for n in 0..3 {
            let event = NormalizedEvent::new("comment", Utc::now(), json!({ "n": n }));
            buffer.append(&room, &session, &event).await.unwrap();
        }
        assert_eq!(buffer.len(&room, &session).await.unwrap(), 3);

        let drained = buffer.drain(&room, &session).await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[2].data["n"], 2);
        assert!(buffer.drain(&room, &session).await.unwrap().is_empty());
    }
}
