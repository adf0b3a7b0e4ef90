//! Spawning collector and archiver processes.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use livetap_core::{RoomId, SessionId};
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};

/// Which child process to launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessRole {
    /// Long-running event collector.
    Collector,
    /// One-shot batch archiver.
    Archiver,
}

impl ProcessRole {
    /// Binary subcommand for this role.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::Collector => "collect",
            Self::Archiver => "archive",
        }
    }

    /// Role name used in logs and log file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collector => "collector",
            Self::Archiver => "archiver",
        }
    }
}

/// Starts child processes for a session.
pub trait Launcher: Send + Sync {
    /// Launch `role` for `(room_id, session_id)` and return its pid.
    ///
    /// The child runs detached from the request; it is not waited on here.
    fn launch(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> Result<u32>;
}

/// Launches the livetap binary with a role subcommand.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    executable: PathBuf,
    settings_path: Option<PathBuf>,
    log_dir: PathBuf,
}

impl CommandLauncher {
    /// Launch `executable`, passing `--settings settings_path` when given and
    /// redirecting output to files under `log_dir`.
    pub fn new(executable: PathBuf, settings_path: Option<PathBuf>, log_dir: PathBuf) -> Self {
        Self {
            executable,
            settings_path,
            log_dir,
        }
    }

    /// Log file for a role and session.
    pub fn log_path(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> PathBuf {
        self.log_dir.join(format!(
            "{}-{}-{}.log",
            role.as_str(),
            urlencoding::encode(room_id),
            urlencoding::encode(session_id)
        ))
    }

    fn args(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.settings_path {
            args.push("--settings".to_owned());
            args.push(path.display().to_string());
        }
        args.extend([
            role.subcommand().to_owned(),
            "--room-id".to_owned(),
            room_id.to_string(),
            "--session-id".to_owned(),
            session_id.to_string(),
        ]);
        args
    }
}

fn spawn_err(role: ProcessRole) -> impl FnOnce(std::io::Error) -> SupervisorError {
    move |source| SupervisorError::Spawn {
        role: role.as_str(),
        source,
    }
}

fn open_log(path: &Path) -> std::io::Result<fs::File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl Launcher for CommandLauncher {
    fn launch(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> Result<u32> {
        let log_path = self.log_path(role, room_id, session_id);
        let log = open_log(&log_path).map_err(spawn_err(role))?;
        let log_err = log.try_clone().map_err(spawn_err(role))?;

        let mut cmd = tokio::process::Command::new(&self.executable);
        let _ = cmd
            .args(self.args(role, room_id, session_id))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(false);

        debug!(executable = %self.executable.display(), role = role.as_str(), "spawning process");
        let mut child = cmd.spawn().map_err(spawn_err(role))?;
        let Some(pid) = child.id() else {
            return Err(SupervisorError::Spawn {
                role: role.as_str(),
                source: std::io::Error::other("child exited before reporting a pid"),
            });
        };

        info!(
            role = role.as_str(),
            room_id = %room_id,
            session_id = %session_id,
            pid,
            log = %log_path.display(),
            "process launched"
        );

        // Reap the child so it does not linger as a zombie.
        let role_name = role.as_str();
        drop(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(role = role_name, pid, %status, "process exited"),
                Err(e) => warn!(role = role_name, pid, error = %e, "waiting on process failed"),
            }
        }));

        Ok(pid)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
