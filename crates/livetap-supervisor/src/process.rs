//! OS process inspection and signalling.
//!
//! A process is identified by pid plus its OS-reported start time, so a
//! recycled pid is never mistaken for the collector that used to own it.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::debug;

/// Identity of a spawned process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessIdentity {
    /// OS process id.
    pub pid: u32,
    /// Start time in seconds since the epoch, when the OS reported one.
    pub started_at: Option<u64>,
}

impl ProcessIdentity {
    /// Identity with only a pid.
    pub fn pid_only(pid: u32) -> Self {
        Self {
            pid,
            started_at: None,
        }
    }
}

/// Process control used by the supervisor.
pub trait ProcessControl: Send + Sync {
    /// Look up the identity of a live pid.
    fn identify(&self, pid: u32) -> Option<ProcessIdentity>;

    /// Whether the identified process is still running. Zombies are not.
    fn is_alive(&self, identity: &ProcessIdentity) -> bool;

    /// Send SIGTERM. Returns whether a signal was delivered.
    fn terminate(&self, identity: &ProcessIdentity) -> bool;

    /// Send SIGKILL. Returns whether a signal was delivered.
    fn kill(&self, identity: &ProcessIdentity) -> bool;
}

/// [`ProcessControl`] backed by `sysinfo`.
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcesses {
    /// Empty process table, refreshed per query.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_process<T>(
        &self,
        identity: &ProcessIdentity,
        f: impl FnOnce(&sysinfo::Process) -> T,
    ) -> Option<T> {
        let pid = Pid::from_u32(identity.pid);
        let mut system = self.system.lock();
        let _ = system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        if let Some(expected) = identity.started_at {
            if process.start_time() != expected {
                debug!(pid = identity.pid, expected, actual = process.start_time(), "pid reused");
                return None;
            }
        }
        if process.status() == ProcessStatus::Zombie {
            return None;
        }
        Some(f(process))
    }
}

impl ProcessControl for SystemProcesses {
    fn identify(&self, pid: u32) -> Option<ProcessIdentity> {
        self.with_process(&ProcessIdentity::pid_only(pid), |p| ProcessIdentity {
            pid,
            started_at: Some(p.start_time()),
        })
    }

    fn is_alive(&self, identity: &ProcessIdentity) -> bool {
        self.with_process(identity, |_| ()).is_some()
    }

    fn terminate(&self, identity: &ProcessIdentity) -> bool {
        self.with_process(identity, |p| p.kill_with(Signal::Term).unwrap_or(false))
            .unwrap_or(false)
    }

    fn kill(&self, identity: &ProcessIdentity) -> bool {
        self.with_process(identity, sysinfo::Process::kill)
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
