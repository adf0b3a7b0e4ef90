//! Settings schema.
//!
//! Every struct is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change. JSON keys are camelCase.

use std::path::PathBuf;
use std::time::Duration;

use livetap_core::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Root settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivetapSettings {
    /// HTTP / WebSocket server.
    pub server: ServerSettings,
    /// Redis connection used for the session buffer and live relay.
    pub redis: RedisSettings,
    /// Archive database.
    pub archive: ArchiveSettings,
    /// Collector process supervision.
    pub supervisor: SupervisorSettings,
    /// Collector behavior.
    pub collector: CollectorSettings,
    /// Broadcast platform endpoints.
    pub source: SourceSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// HTTP / WebSocket server settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Outbound queue depth per subscriber before it is dropped.
    pub subscriber_queue: usize,
    /// Server ping interval.
    pub ping_interval_secs: u64,
    /// Close a subscriber after this long without a pong.
    pub pong_timeout_secs: u64,
    /// Upper bound for the `limit` of event queries.
    pub max_event_query_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            subscriber_queue: 256,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            max_event_query_limit: 1000,
        }
    }
}

/// Redis settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedisSettings {
    /// Connection URL.
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
        }
    }
}

/// Archive database settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveSettings {
    /// `SQLite` file path; `~` expands to the home directory.
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            db_path: "~/.livetap/archive.db".into(),
            pool_size: 4,
        }
    }
}

impl ArchiveSettings {
    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        crate::loader::expand_home(&self.db_path)
    }
}

/// Supervisor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorSettings {
    /// Directory holding one handle file per running collector.
    pub handle_dir: String,
    /// Directory for collector and archiver log files.
    pub log_dir: String,
    /// Executable launched for `collect` / `archive`; defaults to the running binary.
    pub executable: Option<String>,
    /// Interval between exit checks after SIGTERM.
    pub term_poll_interval_ms: u64,
    /// Number of exit checks before escalating to SIGKILL.
    pub term_poll_attempts: u32,
    /// Final wait after SIGKILL.
    pub kill_wait_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            handle_dir: "~/.livetap/collectors".into(),
            log_dir: "~/.livetap/logs".into(),
            executable: None,
            term_poll_interval_ms: 500,
            term_poll_attempts: 4,
            kill_wait_ms: 1000,
        }
    }
}

impl SupervisorSettings {
    /// Resolved handle directory.
    pub fn handle_dir(&self) -> PathBuf {
        crate::loader::expand_home(&self.handle_dir)
    }

    /// Resolved log directory.
    pub fn log_dir(&self) -> PathBuf {
        crate::loader::expand_home(&self.log_dir)
    }
}

/// Collector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorSettings {
    /// Reconnect attempts per failure episode.
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts.
    pub retry_delay_ms: u64,
    /// Total bound on graceful disconnect and buffer flush at shutdown.
    /// Keep it below the supervisor's SIGTERM window.
    pub shutdown_grace_ms: u64,
    /// Event kinds to capture in addition to the built-in catalog.
    pub extra_event_kinds: Vec<String>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_retries: retry.max_retries,
            retry_delay_ms: retry.retry_delay_ms,
            shutdown_grace_ms: 1500,
            extra_event_kinds: Vec::new(),
        }
    }
}

impl CollectorSettings {
    /// Reconnect policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    /// Shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Broadcast platform endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// WebSocket URL with a `{room}` placeholder.
    pub ws_url_template: String,
    /// Base URL of the platform HTTP API (live-status probe).
    pub api_base_url: String,
    /// HTTP request timeout.
    pub request_timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            ws_url_template: "ws://127.0.0.1:9000/live/{room}".into(),
            api_base_url: "http://127.0.0.1:9000".into(),
            request_timeout_ms: 5000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
