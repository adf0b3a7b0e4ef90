//! # livetap-archiver
//!
//! Batch archival of one session's buffer.
//!
//! [`BatchArchiver::run`] snapshots the buffer, tags every event with the
//! room and session, writes the batch in one transaction, and only then
//! trims exactly the archived prefix from the buffer. Events appended
//! after the snapshot stay buffered for a later run.
//!
//! A failed write leaves the buffer untouched and is an error. A failed
//! trim after a successful write is logged and reported, not an error.

#![deny(unsafe_code)]

use std::sync::Arc;

use livetap_core::{ArchivedEvent, RoomId, SessionId};
use livetap_store::{ArchiveStore, BufferError, SessionBuffer, StorageError};
use thiserror::Error;
use tracing::{error, info, warn};

/// Archival failures. The buffer is left intact in every case.
#[derive(Debug, Error)]
pub enum ArchiveRunError {
    /// The buffer could not be read.
    #[error("failed to read session buffer: {0}")]
    Buffer(#[from] BufferError),

    /// The durable write failed.
    #[error("failed to write archive: {0}")]
    Storage(#[from] StorageError),
}

/// What a run did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Nothing was buffered.
    Empty,
    /// Events were written.
    Archived {
        /// Events written.
        count: usize,
        /// Whether the archived prefix was removed from the buffer.
        cleared: bool,
    },
}

/// Drains one session buffer into the archive.
pub struct BatchArchiver {
    buffer: Arc<dyn SessionBuffer>,
    archive: Arc<dyn ArchiveStore>,
}

impl BatchArchiver {
    /// Build an archiver over a buffer and an archive store.
    pub fn new(buffer: Arc<dyn SessionBuffer>, archive: Arc<dyn ArchiveStore>) -> Self {
        Self { buffer, archive }
    }

    /// Archive everything currently buffered for the session.
    pub async fn run(
        &self,
        room_id: &RoomId,
        session_id: &SessionId,
    ) -> Result<ArchiveOutcome, ArchiveRunError> {
        let events = self.buffer.snapshot(room_id, session_id).await?;
        if events.is_empty() {
            info!(room_id = %room_id, session_id = %session_id, "buffer empty, nothing to archive");
            return Ok(ArchiveOutcome::Empty);
        }

        let batch: Vec<ArchivedEvent> = events
            .into_iter()
            .map(|event| event.archived(room_id, session_id))
            .collect();
        let count = batch.len();

        let archive = Arc::clone(&self.archive);
        let written = tokio::task::spawn_blocking(move || archive.insert_many(&batch))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))
            .and_then(|r| r);
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                error!(
                    room_id = %room_id,
                    session_id = %session_id,
                    count,
                    error = %e,
                    "archive write failed, buffer kept"
                );
                return Err(e.into());
            }
        };

        let cleared = match self.buffer.clear(room_id, session_id, count).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    room_id = %room_id,
                    session_id = %session_id,
                    count,
                    error = %e,
                    "archived events could not be cleared from buffer; a retry will archive them again"
                );
                false
            }
        };

        info!(room_id = %room_id, session_id = %session_id, count = written, cleared, "session archived");
        Ok(ArchiveOutcome::Archived {
            count: written,
            cleared,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
