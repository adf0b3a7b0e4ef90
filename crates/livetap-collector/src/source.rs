//! The event source capability set.

use async_trait::async_trait;
use livetap_core::RoomId;

use crate::catalog::SourceEvent;
use crate::errors::SourceError;

/// A streaming connection to a live-broadcast platform.
///
/// The collector drives a source through `connect`, then repeatedly awaits
/// `next_event` until it errors, then either reconnects or `disconnect`s.
/// `next_event` must be cancel-safe: dropping its future between frames
/// loses nothing.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Whether the platform reports `room_id` as live.
    async fn is_live(&self, room_id: &RoomId) -> Result<bool, SourceError>;

    /// Open the event stream for `room_id`, replacing any previous one.
    async fn connect(&mut self, room_id: &RoomId) -> Result<(), SourceError>;

    /// Wait for the next event. A closed stream is [`SourceError::Closed`].
    async fn next_event(&mut self) -> Result<SourceEvent, SourceError>;

    /// Close the stream. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<(), SourceError>;
}
