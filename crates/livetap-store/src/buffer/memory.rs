//! In-process session buffer.
//!
//! Used by tests and single-process setups. Not durable across restarts.

use std::collections::HashMap;

use async_trait::async_trait;
use livetap_core::{NormalizedEvent, RoomId, SessionId};
use parking_lot::Mutex;

use super::{SessionBuffer, buffer_key};
use crate::errors::BufferError;

/// Buffer backed by a map of vectors.
#[derive(Debug, Default)]
pub struct InMemorySessionBuffer {
    lists: Mutex<HashMap<String, Vec<NormalizedEvent>>>,
}

impl InMemorySessionBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one buffered event.
    pub fn session_count(&self) -> usize {
        self.lists.lock().values().filter(|v| !v.is_empty()).count()
    }
}

#[async_trait]
impl SessionBuffer for InMemorySessionBuffer {
    async fn append(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        event: &NormalizedEvent,
    ) -> Result<(), BufferError> {
        self.lists
            .lock()
            .entry(buffer_key(room_id, session_id))
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn snapshot(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Vec<NormalizedEvent>, BufferError> {
        Ok(self
            .lists
            .lock()
            .get(&buffer_key(room_id, session_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        count: usize,
    ) -> Result<(), BufferError> {
        let key = buffer_key(room_id, session_id);
        let mut lists = self.lists.lock();
        let now_empty = match lists.get_mut(&key) {
            Some(list) => {
                let n = count.min(list.len());
                let _ = list.drain(..n);
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            let _ = lists.remove(&key);
        }
        Ok(())
    }

    async fn len(&self, room_id: &RoomId, session_id: &SessionId) -> Result<usize, BufferError> {
        Ok(self
            .lists
            .lock()
            .get(&buffer_key(room_id, session_id))
            .map_or(0, Vec::len))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
