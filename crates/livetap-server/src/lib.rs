//! # livetap-server
//!
//! Axum HTTP + `WebSocket` API for broadcast sessions.
//!
//! - Broadcast endpoints: start, stop, live status, archived events
//! - [`FanoutHub`]: per-room and all-rooms live subscribers, best-effort delivery
//! - Relay bridge: live messages from collector processes into the hub
//! - Health, Prometheus metrics, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod relay;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ApiError;
pub use hub::{FanoutHub, PublishReport, SubscriptionKey};
pub use relay::{DEFAULT_RELAY_RETRY_DELAY, LiveFeed, run_relay_bridge};
pub use server::{AppState, listen, router};
pub use shutdown::ShutdownCoordinator;
