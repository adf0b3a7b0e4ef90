//! Platform event catalog and wire decoding.
//!
//! The platform pushes JSON frames tagged by a `type` field. Kinds with a
//! known schema decode into [`PlatformEvent`]; kinds added through
//! settings are captured untyped. The [`EventCatalog`] is built once at
//! startup and decides which kinds the collector listens to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Kind reported for frames that are not valid JSON objects.
pub const UNPARSEABLE_KIND: &str = "unparseable";

/// Event kinds with a typed schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Viewer comment.
    Comment,
    /// Gift, possibly part of a combo.
    Gift,
    /// Likes.
    Like,
    /// Viewer joined.
    Member,
    /// Viewer followed.
    Follow,
    /// Viewer shared the stream.
    Share,
    /// Viewer subscribed.
    Subscribe,
    /// Viewer count update.
    RoomUserSeq,
    /// Platform confirmed the connection.
    Connect,
    /// Platform closed the session.
    Disconnect,
    /// The broadcast ended.
    LiveEnd,
    /// Room control message.
    Control,
}

impl EventKind {
    /// Every typed kind.
    pub const ALL: [Self; 12] = [
        Self::Comment,
        Self::Gift,
        Self::Like,
        Self::Member,
        Self::Follow,
        Self::Share,
        Self::Subscribe,
        Self::RoomUserSeq,
        Self::Connect,
        Self::Disconnect,
        Self::LiveEnd,
        Self::Control,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Gift => "gift",
            Self::Like => "like",
            Self::Member => "member",
            Self::Follow => "follow",
            Self::Share => "share",
            Self::Subscribe => "subscribe",
            Self::RoomUserSeq => "room_user_seq",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::LiveEnd => "live_end",
            Self::Control => "control",
        }
    }

    /// Look up a kind by wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// A platform user as carried on events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlatformUser {
    /// Stable handle.
    #[serde(default)]
    pub unique_id: Option<String>,
    /// Display name.
    #[serde(default)]
    pub nickname: String,
    /// Fields this schema does not name.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Gift metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GiftDetails {
    /// Gift name.
    #[serde(default)]
    pub name: String,
    /// Unit value.
    #[serde(default)]
    pub diamond_count: u64,
}

fn one() -> u64 {
    1
}

/// Typed platform events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// Viewer comment.
    Comment {
        /// Author.
        user: PlatformUser,
        /// Text.
        comment: String,
    },
    /// Gift.
    Gift {
        /// Sender.
        user: PlatformUser,
        /// What was sent.
        gift: GiftDetails,
        /// Combo size.
        #[serde(default = "one")]
        repeat_count: u64,
        /// Whether the combo is finished.
        #[serde(default)]
        repeat_end: bool,
    },
    /// Likes.
    Like {
        /// Viewer.
        user: PlatformUser,
        /// Likes in this batch.
        #[serde(default = "one")]
        count: u64,
        /// Running total for the room.
        #[serde(default)]
        total: Option<u64>,
    },
    /// Viewer joined.
    Member {
        /// Viewer.
        user: PlatformUser,
    },
    /// Viewer followed.
    Follow {
        /// Viewer.
        user: PlatformUser,
    },
    /// Viewer shared.
    Share {
        /// Viewer.
        user: PlatformUser,
    },
    /// Viewer subscribed.
    Subscribe {
        /// Viewer.
        user: PlatformUser,
    },
    /// Viewer count.
    RoomUserSeq {
        /// Current viewers.
        #[serde(default)]
        viewer_count: u64,
    },
    /// Connection confirmed.
    Connect {
        /// Platform-internal room id.
        #[serde(default)]
        room_id: Option<String>,
    },
    /// Session closed by the platform.
    Disconnect {},
    /// Broadcast ended.
    LiveEnd {},
    /// Room control.
    Control {
        /// Control action name.
        #[serde(default)]
        action: Option<String>,
    },
}

/// One event as delivered by a source: its kind, the raw payload, and the
/// typed decoding when the kind has a schema and the payload matches it.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceEvent {
    /// Wire kind.
    pub kind: String,
    /// Full payload as received.
    pub raw: Value,
    /// Typed form, if any.
    pub typed: Option<PlatformEvent>,
}

impl SourceEvent {
    /// Build from a typed event.
    pub fn from_typed(event: PlatformEvent) -> Self {
        let raw = serde_json::to_value(&event).unwrap_or(Value::Null);
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Self {
            kind,
            raw,
            typed: Some(event),
        }
    }

    /// Whether this event announces the end of the broadcast.
    pub fn is_live_end(&self) -> bool {
        matches!(self.typed, Some(PlatformEvent::LiveEnd {})) || self.kind == EventKind::LiveEnd.as_str()
    }
}

/// The set of event kinds the collector listens to.
#[derive(Clone, Debug)]
pub struct EventCatalog {
    kinds: BTreeSet<String>,
}

impl Default for EventCatalog {
    fn default() -> Self {
        Self::with_extra(std::iter::empty::<String>())
    }
}

impl EventCatalog {
    /// Typed kinds plus `extra` kind names.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut kinds: BTreeSet<String> =
            EventKind::ALL.iter().map(|k| k.as_str().to_owned()).collect();
        kinds.extend(extra.into_iter().map(Into::into).filter(|k: &String| !k.is_empty()));
        Self { kinds }
    }

    /// Whether `kind` is listened to.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Decode one text frame.
    ///
    /// Returns `None` for kinds outside the catalog. Frames that are not
    /// JSON objects with a `type` are still surfaced, under
    /// [`UNPARSEABLE_KIND`], so nothing the platform sends is silently lost.
    pub fn decode(&self, text: &str) -> Option<SourceEvent> {
        let raw: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "frame is not JSON");
                return Some(unparseable(text));
            }
        };
        let Some(kind) = raw.get("type").and_then(Value::as_str).map(str::to_owned) else {
            warn!("frame has no type tag");
            return Some(unparseable(text));
        };
        if !self.contains(&kind) {
            debug!(kind = %kind, "event kind not in catalog, skipping");
            return None;
        }

        let typed = if EventKind::from_wire(&kind).is_some() {
            match serde_json::from_value::<PlatformEvent>(raw.clone()) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "event does not match its schema, keeping raw");
                    None
                }
            }
        } else {
            None
        };

        Some(SourceEvent { kind, raw, typed })
    }
}

fn unparseable(text: &str) -> SourceEvent {
    SourceEvent {
        kind: UNPARSEABLE_KIND.to_owned(),
        raw: Value::String(text.to_owned()),
        typed: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
