//! # livetap-core
//!
//! Shared vocabulary for the livetap ingestion pipeline.
//!
//! - **Ids**: [`RoomId`], [`SessionId`], [`ConnectionId`] newtypes
//! - **Events**: [`NormalizedEvent`] and its archived form [`ArchivedEvent`]
//! - **Live messages**: [`LiveMessage`] pushed to viewers, [`CollectorStatus`]
//! - **Normalizer**: [`normalize`] turns any serializable platform event into a
//!   [`NormalizedEvent`] without ever failing
//! - **Tier ladder**: [`GiftTier`] classification of gift values
//! - **Retry policy**: [`RetryPolicy`] for collector reconnects
//! - **Logging**: subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod live;
pub mod logging;
pub mod normalize;
pub mod retry;
pub mod tier;

pub use events::{ArchivedEvent, NormalizedEvent};
pub use ids::{ConnectionId, RoomId, SessionId};
pub use live::{CollectorStatus, LiveMessage};
pub use normalize::normalize;
pub use retry::RetryPolicy;
pub use tier::GiftTier;
