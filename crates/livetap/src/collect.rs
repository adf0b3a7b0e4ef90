//! `livetap collect`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use livetap_collector::{Collector, CollectorConfig, CollectorOutcome, WebSocketSource};
use livetap_settings::LivetapSettings;
use livetap_store::{RedisLivePublisher, RedisSessionBuffer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{SessionArgs, event_catalog, signals, source_config};

/// Collect one session until it ends, fails, or is signalled.
///
/// Exits 0 on `ended` or `stopped` and non-zero on `failed`.
pub async fn run(settings: &LivetapSettings, args: &SessionArgs) -> Result<ExitCode> {
    let (room_id, session_id) = args.ids();

    let buffer = RedisSessionBuffer::connect(&settings.redis.url)
        .await
        .context("failed to connect session buffer")?;
    let publisher = RedisLivePublisher::connect(&settings.redis.url)
        .await
        .context("failed to connect live relay")?;
    let source = WebSocketSource::new(source_config(&settings.source), event_catalog(&settings.collector))
        .context("failed to build event source")?;

    let config = CollectorConfig {
        retry: settings.collector.retry_policy(),
        shutdown_grace: settings.collector.shutdown_grace(),
    };
    let collector = Collector::new(
        room_id.clone(),
        session_id.clone(),
        source,
        Arc::new(buffer),
        Arc::new(publisher),
        config,
    );

    let cancel = CancellationToken::new();
    signals::cancel_on_signal(cancel.clone());
    info!(room_id = %room_id, session_id = %session_id, pid = std::process::id(), "collector process started");

    let report = collector.run(cancel).await;
    match &report.outcome {
        CollectorOutcome::Failed { reason } => {
            error!(room_id = %room_id, session_id = %session_id, reason, received = report.received, "collector failed");
        }
        outcome => info!(
            room_id = %room_id,
            session_id = %session_id,
            status = outcome.status().as_str(),
            received = report.received,
            discarded = report.discarded,
            "collector finished"
        ),
    }

    Ok(ExitCode::from(u8::try_from(report.outcome.exit_code()).unwrap_or(1)))
}
