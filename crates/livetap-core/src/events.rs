//! Normalized event records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RoomId, SessionId};

/// Event type used for buffer entries that could not be decoded.
pub const UNPARSEABLE_EVENT_TYPE: &str = "unparseable";

/// A platform event reduced to a uniform, serialization-safe record.
///
/// Produced by [`crate::normalize`]. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Platform event kind, e.g. `comment` or `gift`.
    pub event_type: String,
    /// When the collector received the event.
    pub timestamp: DateTime<Utc>,
    /// Sanitized payload.
    pub data: Value,
}

impl NormalizedEvent {
    /// Build an event from already-sanitized parts.
    #[must_use]
    pub fn new(event_type: impl Into<String>, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp,
            data,
        }
    }

    /// Wrap a raw buffer entry that failed to decode so it is archived rather than lost.
    ///
    /// `timestamp` should be that of a neighbouring entry, so the wrapper
    /// keeps its buffer position in timestamp-ordered reads.
    #[must_use]
    pub fn unparseable(raw: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(UNPARSEABLE_EVENT_TYPE, timestamp, Value::String(raw.to_owned()))
    }

    /// Fixed-width RFC3339 form of the timestamp (microseconds, `Z` suffix).
    ///
    /// Text ordering of this form matches chronological ordering.
    #[must_use]
    pub fn timestamp_key(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Tag this event with the session it belongs to.
    #[must_use]
    pub fn archived(self, room_id: &RoomId, session_id: &SessionId) -> ArchivedEvent {
        ArchivedEvent {
            room_id: room_id.clone(),
            session_id: session_id.clone(),
            event: self,
        }
    }
}

/// A [`NormalizedEvent`] tagged with its room and session, as stored in the archive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEvent {
    /// Room the event was collected from.
    pub room_id: RoomId,
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// The event itself.
    #[serde(flatten)]
    pub event: NormalizedEvent,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
