//! Broadcast session records.
//!
//! One row per session start. `ended_at` is written once, when the end is
//! first requested, and never changed afterward.

use chrono::{DateTime, Utc};
use livetap_core::{RoomId, SessionId};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StorageError};
use crate::sqlite::SqliteStore;

/// A broadcast session record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSession {
    /// Session id.
    pub id: SessionId,
    /// Room being collected.
    pub room_id: RoomId,
    /// Associated character, opaque here.
    pub character_id: String,
    /// Start request time.
    pub started_at: DateTime<Utc>,
    /// End request time, if ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl BroadcastSession {
    /// A new, not yet ended session starting now.
    pub fn start(room_id: RoomId, character_id: String) -> Self {
        Self {
            id: SessionId::new(),
            room_id,
            character_id,
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Storage of session records.
pub trait SessionRecordStore: Send + Sync {
    /// Persist a new session.
    fn create(&self, session: &BroadcastSession) -> Result<()>;

    /// Set `ended_at` if not already set. Returns whether a row changed.
    fn mark_ended(&self, session_id: &SessionId, ended_at: DateTime<Utc>) -> Result<bool>;

    /// Look up a session.
    fn get(&self, session_id: &SessionId) -> Result<Option<BroadcastSession>>;
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(raw.to_owned()))
}

impl SessionRecordStore for SqliteStore {
    fn create(&self, session: &BroadcastSession) -> Result<()> {
        let conn = self.conn()?;
        let _ = conn.execute(
            "INSERT INTO live_sessions (id, room_id, character_id, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id.as_str(),
                session.room_id.as_str(),
                session.character_id,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn mark_ended(&self, session_id: &SessionId, ended_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE live_sessions SET ended_at = ?2 WHERE id = ?1 AND ended_at IS NULL",
            params![session_id.as_str(), ended_at.to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    fn get(&self, session_id: &SessionId) -> Result<Option<BroadcastSession>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, room_id, character_id, started_at, ended_at
                 FROM live_sessions WHERE id = ?1",
                params![session_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, room_id, character_id, started_at, ended_at)) = row else {
            return Ok(None);
        };
        Ok(Some(BroadcastSession {
            id: SessionId::from_string(id),
            room_id: RoomId::from_string(room_id),
            character_id,
            started_at: parse_ts(&started_at)?,
            ended_at: ended_at.as_deref().map(parse_ts).transpose()?,
        }))
    }
}
