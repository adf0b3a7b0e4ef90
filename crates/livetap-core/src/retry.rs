//! Reconnect policy for the event source.
//!
//! Fixed-delay retries: after a transient failure the collector waits
//! [`RetryPolicy::delay`] and tries again, up to `max_retries` times.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of reconnect attempts after a transient failure.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default delay between reconnect attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;

/// Reconnect parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Reconnect attempts allowed per failure episode.
    pub max_retries: u32,
    /// Fixed wait before each attempt, in ms.
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Wait before each attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Whether the 1-based `attempt` is still within budget.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_retries
    }

    /// Status detail for the 1-based `attempt`.
    #[must_use]
    pub fn describe(&self, attempt: u32) -> String {
        format!("attempt {attempt}/{}", self.max_retries)
    }
}
