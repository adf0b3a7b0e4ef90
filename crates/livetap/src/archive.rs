//! `livetap archive`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use livetap_archiver::{ArchiveOutcome, BatchArchiver};
use livetap_settings::LivetapSettings;
use livetap_store::{RedisSessionBuffer, SqliteStore};
use tracing::info;

use crate::SessionArgs;

/// Move one session's buffered events into the archive.
///
/// A failed durable write is an error, so the process exits non-zero and
/// the buffer is left for a retry.
pub async fn run(settings: &LivetapSettings, args: &SessionArgs) -> Result<ExitCode> {
    let (room_id, session_id) = args.ids();

    let buffer = RedisSessionBuffer::connect(&settings.redis.url)
        .await
        .context("failed to connect session buffer")?;
    let db_path = settings.archive.db_path();
    let store = SqliteStore::open(&db_path, settings.archive.pool_size)
        .with_context(|| format!("failed to open archive database {}", db_path.display()))?;

    let outcome = BatchArchiver::new(Arc::new(buffer), Arc::new(store))
        .run(&room_id, &session_id)
        .await
        .with_context(|| format!("archival failed for room {room_id} session {session_id}"))?;

    match outcome {
        ArchiveOutcome::Empty => info!(room_id = %room_id, session_id = %session_id, "nothing to archive"),
        ArchiveOutcome::Archived { count, cleared } => {
            info!(room_id = %room_id, session_id = %session_id, count, cleared, "session archived");
        }
    }
    Ok(ExitCode::SUCCESS)
}
