//! Session buffer: ordered, per-session staging of normalized events.
//!
//! A buffer lives outside the collector process, so events already
//! appended survive a collector crash. Entries are only ever consumed by
//! the archival worker, which reads a [`SessionBuffer::snapshot`], writes
//! it durably, and then removes exactly that prefix with
//! [`SessionBuffer::clear`]. Events appended between the read and the
//! clear stay in the buffer.

pub mod memory;
pub mod redis_list;

use async_trait::async_trait;
use livetap_core::{NormalizedEvent, RoomId, SessionId};

use crate::errors::BufferError;

pub use self::memory::InMemorySessionBuffer;
pub use self::redis_list::RedisSessionBuffer;

/// Key of the buffer list for a session.
pub fn buffer_key(room_id: &RoomId, session_id: &SessionId) -> String {
    format!("broadcast:{room_id}:{session_id}:events")
}

/// Append-only staging list per `(room_id, session_id)`.
#[async_trait]
pub trait SessionBuffer: Send + Sync {
    /// Append one event at the tail.
    async fn append(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        event: &NormalizedEvent,
    ) -> Result<(), BufferError>;

    /// All buffered events in insertion order, without removing them.
    async fn snapshot(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Vec<NormalizedEvent>, BufferError>;

    /// Remove the first `count` entries.
    async fn clear(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        count: usize,
    ) -> Result<(), BufferError>;

    /// Number of buffered events.
    async fn len(&self, room_id: &RoomId, session_id: &SessionId) -> Result<usize, BufferError>;

    /// Read everything and clear it.
    async fn drain(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Vec<NormalizedEvent>, BufferError> {
        let events = self.snapshot(room_id, session_id).await?;
        self.clear(room_id, session_id, events.len()).await?;
        Ok(events)
    }
}
