//! Durable archive of session events.
//!
//! The archival worker writes each drained batch with a single
//! [`ArchiveStore::insert_many`]; the query API reads it back ordered by
//! timestamp, ties broken by insertion order.

use chrono::{DateTime, Utc};
use livetap_core::{ArchivedEvent, NormalizedEvent, RoomId, SessionId};
use rusqlite::params;

use crate::errors::{Result, StorageError};
use crate::sqlite::SqliteStore;

/// Archive storage.
pub trait ArchiveStore: Send + Sync {
    /// Write all events in one transaction, preserving slice order.
    fn insert_many(&self, events: &[ArchivedEvent]) -> Result<usize>;

    /// Up to `limit` events of a session, oldest first.
    fn query(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<ArchivedEvent>>;

    /// Number of archived events for a session.
    fn count(&self, room_id: &RoomId, session_id: &SessionId) -> Result<usize>;
}

struct EventRow {
    room_id: String,
    session_id: String,
    event_type: String,
    timestamp: String,
    data: String,
}

impl EventRow {
    fn into_event(self) -> Result<ArchivedEvent> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|_| StorageError::InvalidTimestamp(self.timestamp.clone()))?
            .with_timezone(&Utc);
        let data = serde_json::from_str(&self.data)?;
        Ok(ArchivedEvent {
            room_id: RoomId::from_string(self.room_id),
            session_id: SessionId::from_string(self.session_id),
            event: NormalizedEvent::new(self.event_type, timestamp, data),
        })
    }
}

impl ArchiveStore for SqliteStore {
    fn insert_many(&self, events: &[ArchivedEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let archived_at = Utc::now().to_rfc3339();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events (room_id, session_id, event_type, timestamp, data, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for archived in events {
                let data = serde_json::to_string(&archived.event.data)?;
                let _ = stmt.execute(params![
                    archived.room_id.as_str(),
                    archived.session_id.as_str(),
                    archived.event.event_type,
                    archived.event.timestamp_key(),
                    data,
                    archived_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    }

    fn query(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<ArchivedEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT room_id, session_id, event_type, timestamp, data
             FROM events
             WHERE room_id = ?1 AND session_id = ?2
             ORDER BY timestamp ASC, id ASC
             LIMIT ?3",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![room_id.as_str(), session_id.as_str(), limit], |row| {
                Ok(EventRow {
                    room_id: row.get(0)?,
                    session_id: row.get(1)?,
                    event_type: row.get(2)?,
                    timestamp: row.get(3)?,
                    data: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(EventRow::into_event).collect()
    }

    fn count(&self, room_id: &RoomId, session_id: &SessionId) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE room_id = ?1 AND session_id = ?2",
            params![room_id.as_str(), session_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
