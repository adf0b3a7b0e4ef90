//! Supervisor errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing collector handle records.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Filesystem failure.
    #[error("handle io error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A record for this `(room_id, session_id)` already exists.
    #[error("handle already exists at {0}")]
    Exists(PathBuf),

    /// Record could not be (de)serialized.
    #[error("handle json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from supervisor operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A collector is already running for the room.
    #[error("a collector is already running for room {room_id} (session {session_id})")]
    AlreadyRunning {
        /// Room.
        room_id: String,
        /// Session of the running collector.
        session_id: String,
    },

    /// The room still has the handle of an exited collector whose session
    /// was never stopped, so its buffer has not been archived yet.
    #[error("session {session_id} of room {room_id} was never stopped; stop it before starting a new one")]
    Unstopped {
        /// Room.
        room_id: String,
        /// Session left behind by the exited collector.
        session_id: String,
    },

    /// The new collector was launched but its handle could not be written.
    #[error("failed to record collector {pid} (kill sent: {kill_sent}): {source}")]
    HandleWrite {
        /// Pid of the launched collector.
        pid: u32,
        /// Whether SIGKILL reached the untracked process.
        kill_sent: bool,
        /// Underlying error.
        #[source]
        source: HandleError,
    },

    /// The child process could not be started.
    #[error("failed to launch {role}: {source}")]
    Spawn {
        /// `collector` or `archiver`.
        role: &'static str,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Handle store failure.
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// Convenience alias.
pub type Result<T, E = SupervisorError> = std::result::Result<T, E>;
