//! `livetap serve`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use livetap_collector::WebSocketSource;
use livetap_server::{AppState, DEFAULT_RELAY_RETRY_DELAY, ServerConfig, listen, run_relay_bridge};
use livetap_settings::{LivetapSettings, SupervisorSettings, expand_home};
use chrono::Utc;
use livetap_store::{RedisLiveSubscriber, SessionRecordStore, SqliteStore};
use livetap_supervisor::{
    CollectorHandle, CommandLauncher, HandleStore, StopTiming, Supervisor, SystemProcesses,
};
use tracing::{debug, info, warn};

use crate::{event_catalog, signals, source_config};

fn stop_timing(settings: &SupervisorSettings) -> StopTiming {
    StopTiming {
        poll_interval: Duration::from_millis(settings.term_poll_interval_ms),
        poll_attempts: settings.term_poll_attempts,
        kill_wait: Duration::from_millis(settings.kill_wait_ms),
    }
}

fn executable(settings: &SupervisorSettings) -> Result<PathBuf> {
    match &settings.executable {
        Some(path) => Ok(expand_home(path)),
        None => std::env::current_exe().context("cannot resolve the running executable"),
    }
}

/// End the sessions whose exited collectors the reconcile sweep archived.
fn mark_recovered_ended(sessions: &dyn SessionRecordStore, recovered: &[CollectorHandle]) {
    let ended_at = Utc::now();
    for handle in recovered {
        match sessions.mark_ended(&handle.session_id, ended_at) {
            Ok(true) => info!(session_id = %handle.session_id, "orphaned session marked ended"),
            Ok(false) => debug!(session_id = %handle.session_id, "orphaned session unknown or already ended"),
            Err(e) => warn!(session_id = %handle.session_id, error = %e, "failed to mark orphaned session ended"),
        }
    }
}

/// Run the API server until a shutdown signal.
pub async fn run(settings: LivetapSettings, settings_path: Option<PathBuf>) -> Result<()> {
    let metrics = livetap_server::metrics::install_recorder().context("failed to install metrics recorder")?;

    let db_path = settings.archive.db_path();
    let store = SqliteStore::open(&db_path, settings.archive.pool_size)
        .with_context(|| format!("failed to open archive database {}", db_path.display()))?;

    let launcher = CommandLauncher::new(
        executable(&settings.supervisor)?,
        settings_path,
        settings.supervisor.log_dir(),
    );
    let supervisor = Arc::new(Supervisor::new(
        HandleStore::new(settings.supervisor.handle_dir()),
        Arc::new(launcher),
        Arc::new(SystemProcesses::new()),
        stop_timing(&settings.supervisor),
    ));
    let reconciled = supervisor
        .reconcile()
        .await
        .context("failed to reconcile collector handles")?;
    mark_recovered_ended(&store, &reconciled.recovered);
    info!(
        alive = reconciled.alive,
        recovered = reconciled.recovered.len(),
        pending = reconciled.pending,
        "collector handles reconciled"
    );

    let probe = WebSocketSource::new(source_config(&settings.source), event_catalog(&settings.collector))
        .context("failed to build live-status probe")?;

    let state = AppState::new(
        ServerConfig::from_settings(&settings.server),
        supervisor,
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(probe),
    )
    .with_metrics(metrics);
    let shutdown = Arc::clone(&state.shutdown);
    signals::cancel_on_signal(shutdown.token());

    let feed = RedisLiveSubscriber::new(&settings.redis.url).context("invalid redis url")?;
    let bridge = tokio::spawn(run_relay_bridge(
        Arc::new(feed),
        Arc::clone(&state.hub),
        DEFAULT_RELAY_RETRY_DELAY,
        shutdown.token(),
    ));

    let (addr, server) = listen(state).await.context("failed to bind server")?;
    info!(%addr, "livetap listening");

    shutdown.token().cancelled().await;
    info!("shutting down");
    shutdown.drain(vec![server, bridge], None).await;
    info!("shutdown complete");
    Ok(())
}
