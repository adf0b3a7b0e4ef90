//! Shared fakes and app construction for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use livetap_collector::{EventSource, SourceError, SourceEvent};
use livetap_core::{RoomId, SessionId};
use livetap_server::{AppState, ServerConfig};
use livetap_store::SqliteStore;
use livetap_supervisor::{
    HandleStore, Launcher, ProcessControl, ProcessIdentity, ProcessRole, StopTiming, Supervisor,
    SupervisorError,
};
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Records launches and hands out increasing pids.
#[derive(Default)]
pub struct RecordingLauncher {
    next_pid: AtomicU32,
    pub launches: Mutex<Vec<(ProcessRole, RoomId, SessionId, u32)>>,
    pub processes: Arc<FakeProcesses>,
    pub fail: Mutex<bool>,
}

impl RecordingLauncher {
    pub fn archiver_launches(&self) -> Vec<(RoomId, SessionId)> {
        self.launches
            .lock()
            .iter()
            .filter(|(role, ..)| *role == ProcessRole::Archiver)
            .map(|(_, room, session, _)| (room.clone(), session.clone()))
            .collect()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> Result<u32, SupervisorError> {
        if *self.fail.lock() {
            return Err(SupervisorError::Spawn {
                role: role.as_str(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such executable"),
            });
        }
        let pid = 500 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        if role == ProcessRole::Collector {
            self.processes.spawn(pid);
        }
        self.launches
            .lock()
            .push((role, room_id.clone(), session_id.clone(), pid));
        Ok(pid)
    }
}

/// Processes that exit on the first SIGTERM.
#[derive(Default)]
pub struct FakeProcesses {
    alive: Mutex<HashSet<u32>>,
}

impl FakeProcesses {
    pub fn spawn(&self, pid: u32) {
        let _ = self.alive.lock().insert(pid);
    }

    pub fn exit(&self, pid: u32) {
        let _ = self.alive.lock().remove(&pid);
    }
}

impl ProcessControl for FakeProcesses {
    fn identify(&self, pid: u32) -> Option<ProcessIdentity> {
        self.alive.lock().contains(&pid).then_some(ProcessIdentity::pid_only(pid))
    }

    fn is_alive(&self, identity: &ProcessIdentity) -> bool {
        self.alive.lock().contains(&identity.pid)
    }

    fn terminate(&self, identity: &ProcessIdentity) -> bool {
        self.alive.lock().remove(&identity.pid)
    }

    fn kill(&self, identity: &ProcessIdentity) -> bool {
        self.alive.lock().remove(&identity.pid)
    }
}

/// Live-status probe with a fixed answer.
pub struct FixedProbe {
    pub live: Option<bool>,
}

#[async_trait]
impl EventSource for FixedProbe {
    async fn is_live(&self, _room_id: &RoomId) -> Result<bool, SourceError> {
        self.live
            .ok_or_else(|| SourceError::SignService("status 403".into()))
    }

    async fn connect(&mut self, _room_id: &RoomId) -> Result<(), SourceError> {
        Err(SourceError::NotConnected)
    }

    async fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
        Err(SourceError::NotConnected)
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// A fully wired app over fakes, an in-memory database, and a temp handle dir.
pub struct TestApp {
    pub state: AppState,
    pub store: SqliteStore,
    pub launcher: Arc<RecordingLauncher>,
    pub processes: Arc<FakeProcesses>,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_probe(FixedProbe { live: Some(true) })
    }

    pub fn with_probe(probe: FixedProbe) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let processes = Arc::new(FakeProcesses::default());
        let launcher = Arc::new(RecordingLauncher {
            processes: Arc::clone(&processes),
            ..RecordingLauncher::default()
        });
        let timing = StopTiming {
            poll_interval: Duration::from_millis(10),
            poll_attempts: 4,
            kill_wait: Duration::from_millis(10),
        };
        let supervisor = Supervisor::new(
            HandleStore::new(dir.path().join("collectors")),
            Arc::clone(&launcher) as Arc<dyn Launcher>,
            Arc::clone(&processes) as Arc<dyn ProcessControl>,
            timing,
        );
        let store = SqliteStore::open_in_memory().unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        let state = AppState::new(
            config,
            Arc::new(supervisor),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(probe),
        );
        Self {
            state,
            store,
            launcher,
            processes,
            _dir: dir,
        }
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = livetap_server::router(self.state.clone())
            .oneshot(req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}
