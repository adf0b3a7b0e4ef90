//! # livetap-supervisor
//!
//! Collector process lifecycle.
//!
//! - [`HandleStore`]: one durable [`CollectorHandle`] per running collector,
//!   so a stop request finds the process even after a server restart
//! - [`ProcessControl`]: liveness and signalling by pid plus start time
//! - [`Launcher`]: spawns `collect` / `archive` children with per-role logs
//! - [`Supervisor`]: start with a per-room duplicate guard, stop with
//!   SIGTERM → poll → SIGKILL escalation, and a startup reconcile sweep

#![deny(unsafe_code)]

pub mod errors;
pub mod handle;
pub mod launcher;
pub mod process;
pub mod supervisor;

pub use errors::{HandleError, SupervisorError};
pub use handle::{CollectorHandle, HandleStore};
pub use launcher::{CommandLauncher, Launcher, ProcessRole};
pub use process::{ProcessControl, ProcessIdentity, SystemProcesses};
pub use supervisor::{ReconcileReport, StopOutcome, StopTiming, Supervisor};
