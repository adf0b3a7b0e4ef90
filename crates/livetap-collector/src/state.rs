//! Collector lifecycle state machine.
//!
//! ```text
//! Starting ─▶ Connecting ─▶ Connected ◀─▶ Reconnecting
//!                 │             │               │
//!                 └─────────────┴───────────────┴─▶ Ended | Failed | Stopped
//! ```
//!
//! `Reconnecting` may repeat, once per retry attempt.

use livetap_core::CollectorStatus;
use thiserror::Error;

/// A transition the machine does not allow.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid collector transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State before.
    pub from: CollectorStatus,
    /// Rejected target.
    pub to: CollectorStatus,
}

/// Tracks the current state and validates transitions.
#[derive(Debug)]
pub struct StateMachine {
    state: CollectorStatus,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            state: CollectorStatus::Starting,
        }
    }
}

impl StateMachine {
    /// A machine in `Starting`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> CollectorStatus {
        self.state
    }

    /// Whether `from -> to` is allowed.
    pub fn allows(from: CollectorStatus, to: CollectorStatus) -> bool {
        use CollectorStatus::{Connected, Connecting, Ended, Failed, Reconnecting, Starting, Stopped};

        matches!(
            (from, to),
            (Starting, Connecting | Failed | Stopped)
                | (Connecting, Connected | Reconnecting | Ended | Failed | Stopped)
                | (Connected, Reconnecting | Ended | Failed | Stopped)
                | (Reconnecting, Connected | Reconnecting | Ended | Failed | Stopped)
        )
    }

    /// Move to `to` if allowed.
    pub fn advance(&mut self, to: CollectorStatus) -> Result<CollectorStatus, InvalidTransition> {
        if Self::allows(self.state, to) {
            let from = self.state;
            self.state = to;
            Ok(from)
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}
