//! # livetap-collector
//!
//! Connects to a live-broadcast platform for one room and feeds the session
//! buffer and the live relay.
//!
//! - **Source**: [`EventSource`] capability set, with [`WebSocketSource`]
//!   speaking the platform's WebSocket stream and HTTP status probe
//! - **Catalog**: [`EventCatalog`] of subscribed kinds and typed
//!   [`PlatformEvent`] decoding
//! - **Collector**: [`Collector`] reconnect loop, state machine, and ordered
//!   buffer writer

#![deny(unsafe_code)]

pub mod catalog;
pub mod collector;
pub mod errors;
pub mod source;
pub mod state;
pub mod websocket;

pub use catalog::{EventCatalog, EventKind, PlatformEvent, SourceEvent};
pub use collector::{Collector, CollectorConfig, CollectorOutcome, CollectorReport, WriterStats};
pub use errors::{FailureClass, SourceError};
pub use source::EventSource;
pub use state::StateMachine;
pub use websocket::{SourceConfig, WebSocketSource};
