//! Server configuration.

use std::time::Duration;

use livetap_settings::ServerSettings;

/// Runtime configuration for the HTTP and WebSocket server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind; `0` picks a free port.
    pub port: u16,
    /// Per-subscriber outbound queue depth.
    pub subscriber_queue: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Silence after which a subscriber is dropped.
    pub pong_timeout: Duration,
    /// Upper bound on `limit` for event queries.
    pub max_event_query_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    /// Build from the settings file section.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            subscriber_queue: settings.subscriber_queue.max(1),
            ping_interval: Duration::from_secs(settings.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(settings.pong_timeout_secs.max(1)),
            max_event_query_limit: settings.max_event_query_limit.max(1),
        }
    }

    /// Clamp a requested query limit to `1..=max_event_query_limit`.
    pub fn clamp_limit(&self, requested: Option<i64>) -> usize {
        const DEFAULT_LIMIT: usize = 100;
        match requested {
            None => DEFAULT_LIMIT.min(self.max_event_query_limit),
            Some(n) => usize::try_from(n)
                .unwrap_or(1)
                .clamp(1, self.max_event_query_limit),
        }
    }
}
