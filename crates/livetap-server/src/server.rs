//! Shared state, router, and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use livetap_collector::EventSource;
use livetap_store::{ArchiveStore, SessionRecordStore};
use livetap_supervisor::Supervisor;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::FanoutHub;
use crate::metrics::track_http_metrics;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Collector lifecycle.
    pub supervisor: Arc<Supervisor>,
    /// Session records.
    pub sessions: Arc<dyn SessionRecordStore>,
    /// Archived events.
    pub archive: Arc<dyn ArchiveStore>,
    /// Live-status probe.
    pub probe: Arc<dyn EventSource>,
    /// Live fan-out.
    pub hub: Arc<FanoutHub>,
    /// Shutdown signal.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Process start, for uptime.
    pub start_time: Instant,
    /// Prometheus renderer, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State with a fresh hub and shutdown coordinator.
    pub fn new(
        config: ServerConfig,
        supervisor: Arc<Supervisor>,
        sessions: Arc<dyn SessionRecordStore>,
        archive: Arc<dyn ArchiveStore>,
        probe: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            supervisor,
            sessions,
            archive,
            probe,
            hub: Arc::new(FanoutHub::new(config.subscriber_queue)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            config: Arc::new(config),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/broadcast/start", post(routes::start_broadcast))
        .route("/broadcast/stop", post(routes::stop_broadcast))
        .route("/broadcast/status", get(routes::broadcast_status))
        .route("/broadcast/events", get(routes::broadcast_events))
        .route("/ws", get(routes::ws_all_rooms))
        .route("/ws/{room_id}", get(routes::ws_room))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the state's shutdown token fires.
///
/// Returns the bound address (useful with port `0`) and the server task.
pub async fn listen(state: AppState) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind((state.config.host.as_str(), state.config.port)).await?;
    let addr = listener.local_addr()?;
    let token = state.shutdown.token();
    let app = router(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "http server failed");
        }
        info!("http server stopped");
    });

    info!(%addr, "livetap server listening");
    Ok((addr, handle))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.hub.room_count(),
        state.shutdown.is_shutting_down(),
    ))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
