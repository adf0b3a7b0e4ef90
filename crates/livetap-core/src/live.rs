//! Messages pushed to live subscribers.
//!
//! [`LiveMessage`] is the JSON shape viewers receive over the subscription
//! channel, tagged by `type`. Collectors publish these; the fan-out hub
//! delivers them unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::NormalizedEvent;
use crate::ids::{RoomId, SessionId};
use crate::tier::GiftTier;

/// Collector lifecycle state, broadcast on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorStatus {
    /// Process launched, adapter not yet connecting.
    Starting,
    /// First connection attempt in progress.
    Connecting,
    /// Receiving live events.
    Connected,
    /// Transient drop, retrying.
    Reconnecting,
    /// The broadcast itself ended.
    Ended,
    /// Unrecoverable error or retries exhausted.
    Failed,
    /// Shut down on request.
    Stopped,
}

impl CollectorStatus {
    /// Whether no further transitions can follow.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Failed | Self::Stopped)
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Ended => "ended",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// A message delivered to live subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Viewer comment.
    Chat {
        /// Source room.
        room_id: RoomId,
        /// Display name of the commenter.
        user_nickname: String,
        /// Comment text.
        content: String,
        /// Receive time.
        timestamp: DateTime<Utc>,
    },
    /// Gift with its tier classification.
    Gift {
        /// Source room.
        room_id: RoomId,
        /// Display name of the sender.
        user_nickname: String,
        /// Gift name as reported by the platform.
        gift_name: String,
        /// Unit value of the gift.
        gift_coin: u64,
        /// Number of gifts in the combo.
        repeat_count: u64,
        /// `gift_coin * repeat_count`.
        value: u64,
        /// Tier derived from `value`.
        tier: GiftTier,
        /// Reaction asset tag for the tier.
        motion_tag: String,
        /// Receive time.
        timestamp: DateTime<Utc>,
    },
    /// Likes.
    Like {
        /// Source room.
        room_id: RoomId,
        /// Display name of the viewer.
        user_nickname: String,
        /// Number of likes in this batch.
        count: u64,
        /// Receive time.
        timestamp: DateTime<Utc>,
    },
    /// Any other normalized event.
    Event {
        /// Source room.
        room_id: RoomId,
        /// The normalized event.
        event: NormalizedEvent,
    },
    /// Collector status transition.
    Status {
        /// Source room.
        room_id: RoomId,
        /// Session the collector serves.
        session_id: SessionId,
        /// New state.
        status: CollectorStatus,
        /// Human-readable context, e.g. `attempt 1/2`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },
}

impl LiveMessage {
    /// Build a gift message, deriving value, tier and motion tag.
    #[must_use]
    pub fn gift(
        room_id: RoomId,
        user_nickname: String,
        gift_name: String,
        gift_coin: u64,
        repeat_count: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let value = gift_coin.saturating_mul(repeat_count.max(1));
        let tier = GiftTier::classify(value);
        Self::Gift {
            room_id,
            user_nickname,
            gift_name,
            gift_coin,
            repeat_count,
            value,
            tier,
            motion_tag: tier.motion_tag(),
            timestamp,
        }
    }

    /// Build a status message stamped now.
    #[must_use]
    pub fn status(
        room_id: RoomId,
        session_id: SessionId,
        status: CollectorStatus,
        detail: Option<String>,
    ) -> Self {
        Self::Status {
            room_id,
            session_id,
            status,
            detail,
            timestamp: Utc::now(),
        }
    }

    /// The room this message belongs to.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::Chat { room_id, .. }
            | Self::Gift { room_id, .. }
            | Self::Like { room_id, .. }
            | Self::Event { room_id, .. }
            | Self::Status { room_id, .. } => room_id,
        }
    }

    /// Wire tag of this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Gift { .. } => "gift",
            Self::Like { .. } => "like",
            Self::Event { .. } => "event",
            Self::Status { .. } => "status",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
