//! Durable collector handle records.
//!
//! One JSON file per running collector at
//! `<root>/<enc(room_id)>/<enc(session_id)>.json`. Path segments are
//! percent-encoded, so any room handle maps to a single directory. Files
//! are created with `create_new`, which makes a second record for the same
//! session fail instead of overwriting the first.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use livetap_core::{RoomId, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::HandleError;
use crate::process::ProcessIdentity;

/// A running collector's identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorHandle {
    /// Room being collected.
    pub room_id: RoomId,
    /// Session being collected.
    pub session_id: SessionId,
    /// OS process id.
    pub pid: u32,
    /// OS-reported process start time, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_started_at: Option<u64>,
    /// When the supervisor spawned the process.
    pub spawned_at: DateTime<Utc>,
}

impl CollectorHandle {
    /// Build a record for a freshly spawned process.
    pub fn new(room_id: RoomId, session_id: SessionId, identity: ProcessIdentity) -> Self {
        Self {
            room_id,
            session_id,
            pid: identity.pid,
            process_started_at: identity.started_at,
            spawned_at: Utc::now(),
        }
    }

    /// The recorded process identity.
    pub fn identity(&self) -> ProcessIdentity {
        ProcessIdentity {
            pid: self.pid,
            started_at: self.process_started_at,
        }
    }
}

/// Directory-backed handle store.
#[derive(Clone, Debug)]
pub struct HandleStore {
    root: PathBuf,
}

/// Percent-encode one path segment. `.` and `..` survive plain encoding,
/// so their dots are escaped too.
fn segment(raw: &str) -> String {
    let encoded = urlencoding::encode(raw).into_owned();
    if encoded.chars().all(|c| c == '.') {
        encoded.replace('.', "%2E")
    } else {
        encoded
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HandleError + '_ {
    move |source| HandleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl HandleStore {
    /// Store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn room_dir(&self, room_id: &RoomId) -> PathBuf {
        self.root.join(segment(room_id))
    }

    /// File path for a session's record.
    pub fn path_for(&self, room_id: &RoomId, session_id: &SessionId) -> PathBuf {
        self.room_dir(room_id)
            .join(format!("{}.json", segment(session_id)))
    }

    /// Write a new record. Fails with [`HandleError::Exists`] if one is present.
    pub fn create(&self, handle: &CollectorHandle) -> Result<PathBuf, HandleError> {
        let dir = self.room_dir(&handle.room_id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let path = self.path_for(&handle.room_id, &handle.session_id);
        let json = serde_json::to_vec_pretty(handle)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(HandleError::Exists(path)),
            Err(e) => return Err(io_err(&path)(e)),
        };
        file.write_all(&json).map_err(io_err(&path))?;
        file.sync_all().map_err(io_err(&path))?;
        debug!(path = %path.display(), pid = handle.pid, "collector handle written");
        Ok(path)
    }

    /// Read a session's record.
    pub fn load(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<Option<CollectorHandle>, HandleError> {
        read_handle(&self.path_for(room_id, session_id))
    }

    /// All records for a room.
    pub fn for_room(&self, room_id: &RoomId) -> Result<Vec<CollectorHandle>, HandleError> {
        list_dir(&self.room_dir(room_id))
    }

    /// Delete a session's record. Returns whether a file was removed.
    pub fn remove(&self, room_id: &RoomId, session_id: &SessionId) -> Result<bool, HandleError> {
        let path = self.path_for(room_id, session_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                let room_dir = self.room_dir(room_id);
                // Only succeeds once the room has no records left.
                let _ = fs::remove_dir(&room_dir);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    /// Every record in the store.
    pub fn all(&self) -> Result<Vec<CollectorHandle>, HandleError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.root)(e)),
        };
        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_err(&self.root))?;
            if entry.path().is_dir() {
                handles.extend(list_dir(&entry.path())?);
            }
        }
        Ok(handles)
    }
}

fn read_handle(path: &Path) -> Result<Option<CollectorHandle>, HandleError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

fn list_dir(dir: &Path) -> Result<Vec<CollectorHandle>, HandleError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir)(e)),
    };
    let mut handles = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_err(dir))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_handle(&path) {
            Ok(Some(handle)) => handles.push(handle),
            Ok(None) => {}
            Err(HandleError::Json(e)) => {
                warn!(path = %path.display(), error = %e, "unreadable collector handle skipped");
            }
            Err(e) => return Err(e),
        }
    }
    handles.sort_by(|a, b| a.spawned_at.cmp(&b.spawned_at));
    Ok(handles)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
