//! Broadcast session endpoints and WebSocket upgrades.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use chrono::Utc;
use livetap_core::{RoomId, SessionId};
use livetap_store::{BroadcastSession, StorageError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::errors::{ApiError, require};
use crate::hub::SubscriptionKey;
use crate::server::AppState;
use crate::websocket::{Keepalive, run_ws_session};

/// `POST /broadcast/start` body.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    character_id: String,
}

/// `POST /broadcast/stop` body.
#[derive(Debug, Deserialize)]
pub struct StopRequest {
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    session_id: String,
}

/// `GET /broadcast/status` query.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    room_id: Option<String>,
}

/// `GET /broadcast/events` query.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    room_id: Option<String>,
    session_id: Option<String>,
    limit: Option<i64>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(inner)| inner)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Run a blocking store call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}

/// Spawn a collector for a room and record the new session.
pub async fn start_broadcast(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = body(payload)?;
    let room_id = RoomId::from(require("room_id", &req.room_id)?);
    let character_id = require("character_id", &req.character_id)?.to_owned();

    let session = BroadcastSession::start(room_id.clone(), character_id);
    let handle = state.supervisor.start(&room_id, &session.id).await?;

    let sessions = Arc::clone(&state.sessions);
    let record = session.clone();
    if let Err(e) = blocking(move || sessions.create(&record)).await {
        error!(room_id = %room_id, session_id = %session.id, error = %e, "session record write failed, stopping collector");
        if let Err(stop_err) = state.supervisor.stop(&room_id, &session.id).await {
            warn!(room_id = %room_id, error = %stop_err, "rollback stop failed");
        }
        return Err(e.into());
    }

    info!(room_id = %room_id, session_id = %session.id, pid = handle.pid, "broadcast started");
    Ok(Json(json!({
        "message": "broadcast started",
        "session_id": session.id,
    })))
}

/// Stop the collector, mark the session ended, and launch archival.
///
/// Collector termination problems are logged and reported in the
/// `collector` field; they never block archival.
pub async fn stop_broadcast(
    State(state): State<AppState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = body(payload)?;
    let room_id = RoomId::from(require("room_id", &req.room_id)?);
    let session_id = SessionId::from(require("session_id", &req.session_id)?);

    let collector = match state.supervisor.stop(&room_id, &session_id).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(room_id = %room_id, session_id = %session_id, error = %e, "collector stop failed, continuing to archival");
            None
        }
    };

    let ended_at = Utc::now();
    let sessions = Arc::clone(&state.sessions);
    let sid = session_id.clone();
    match blocking(move || sessions.mark_ended(&sid, ended_at)).await {
        Ok(true) => {}
        Ok(false) => debug!(session_id = %session_id, "session unknown or already ended"),
        Err(e) => warn!(session_id = %session_id, error = %e, "failed to mark session ended"),
    }

    let pid = state.supervisor.launch_archiver(&room_id, &session_id)?;
    info!(room_id = %room_id, session_id = %session_id, archiver_pid = pid, ?collector, "broadcast stopped");

    Ok(Json(json!({
        "message": "broadcast stopped, archival started",
        "ended_at": ended_at,
        "collector": collector,
    })))
}

/// Ask the platform whether a room is live. Probe failures are not 5xx.
pub async fn broadcast_status(
    State(state): State<AppState>,
    params: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let room = query(params)?.room_id.unwrap_or_default();
    let room_id = RoomId::from(require("room_id", &room)?);

    match state.probe.is_live(&room_id).await {
        Ok(is_live) => Ok(Json(json!({ "is_live": is_live }))),
        Err(e) => {
            warn!(room_id = %room_id, error = %e, "live status probe failed");
            Ok(Json(json!({ "is_live": false, "detail": e.to_string() })))
        }
    }
}

/// Archived events of a session, oldest first.
pub async fn broadcast_events(
    State(state): State<AppState>,
    params: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let q = query(params)?;
    let room = q.room_id.unwrap_or_default();
    let session = q.session_id.unwrap_or_default();
    let room_id = RoomId::from(require("room_id", &room)?);
    let session_id = SessionId::from(require("session_id", &session)?);
    let limit = state.config.clamp_limit(q.limit);

    let archive = Arc::clone(&state.archive);
    let events = blocking(move || archive.query(&room_id, &session_id, limit)).await?;
    Ok(Json(json!({ "events": events })))
}

/// `GET /ws`: every room.
pub async fn ws_all_rooms(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, &state, SubscriptionKey::All)
}

/// `GET /ws/{room_id}`: one room. The id is trimmed like the session endpoints'.
pub async fn ws_room(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let room_id = RoomId::from(require("room_id", &room_id)?);
    Ok(upgrade(ws, &state, SubscriptionKey::Room(room_id)))
}

fn upgrade(ws: WebSocketUpgrade, state: &AppState, key: SubscriptionKey) -> Response {
    let hub = Arc::clone(&state.hub);
    let shutdown = state.shutdown.token();
    let keepalive = Keepalive {
        ping_interval: state.config.ping_interval,
        pong_timeout: state.config.pong_timeout,
    };
    ws.on_upgrade(move |socket| async move {
        let _ = run_ws_session(socket, hub, key, keepalive, shutdown).await;
    })
}
