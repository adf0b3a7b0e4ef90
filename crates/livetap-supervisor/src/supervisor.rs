//! Collector lifecycle: start with a duplicate guard, stop with
//! graceful-then-forceful escalation, and a startup reconcile sweep.
//!
//! All handle reads and writes for a room happen under that room's async
//! lock, so two concurrent starts cannot both pass the duplicate check.
//! A handle is only ever removed by `stop` or by `reconcile` after the
//! session's archiver has been launched, so buffered events always have a
//! path to the archive.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use livetap_core::{RoomId, SessionId};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::errors::{HandleError, Result, SupervisorError};
use crate::handle::{CollectorHandle, HandleStore};
use crate::launcher::{Launcher, ProcessRole};
use crate::process::{ProcessControl, ProcessIdentity};

/// Collectors started (counter).
pub const COLLECTORS_STARTED_TOTAL: &str = "livetap_collectors_started_total";
/// Collectors stopped (counter, label: outcome).
pub const COLLECTORS_STOPPED_TOTAL: &str = "livetap_collectors_stopped_total";
/// Archivers launched (counter).
pub const ARCHIVERS_LAUNCHED_TOTAL: &str = "livetap_archivers_launched_total";

/// Stop escalation timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StopTiming {
    /// Delay between exit checks after SIGTERM.
    pub poll_interval: Duration,
    /// Exit checks before escalating.
    pub poll_attempts: u32,
    /// Final wait after SIGKILL.
    pub kill_wait: Duration,
}

impl Default for StopTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            poll_attempts: 4,
            kill_wait: Duration::from_secs(1),
        }
    }
}

/// What a stop request found and did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// No handle was recorded.
    NotRunning,
    /// The process had already exited.
    AlreadyExited,
    /// Exited after SIGTERM.
    Terminated,
    /// Exited after SIGKILL.
    Killed,
    /// Still alive after SIGKILL.
    Leaked,
}

impl StopOutcome {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRunning => "not_running",
            Self::AlreadyExited => "already_exited",
            Self::Terminated => "terminated",
            Self::Killed => "killed",
            Self::Leaked => "leaked",
        }
    }
}

/// Result of a reconcile sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Handles whose process is alive.
    pub alive: usize,
    /// Sessions of exited collectors: archiver launched, handle removed.
    pub recovered: Vec<CollectorHandle>,
    /// Exited collectors whose archiver could not be launched. Their
    /// handles are kept, so a later `stop` still archives them.
    pub pending: usize,
}

/// Launches, tracks, and stops collector processes.
pub struct Supervisor {
    handles: HandleStore,
    launcher: Arc<dyn Launcher>,
    processes: Arc<dyn ProcessControl>,
    timing: StopTiming,
    room_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl Supervisor {
    /// Build a supervisor.
    pub fn new(
        handles: HandleStore,
        launcher: Arc<dyn Launcher>,
        processes: Arc<dyn ProcessControl>,
        timing: StopTiming,
    ) -> Self {
        Self {
            handles,
            launcher,
            processes,
            timing,
            room_locks: DashMap::new(),
        }
    }

    /// The handle store.
    pub fn handles(&self) -> &HandleStore {
        &self.handles
    }

    fn room_lock(&self, room_id: &RoomId) -> Arc<AsyncMutex<()>> {
        self.room_locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the room's lock entry once nobody else holds or waits on it.
    fn release_room_lock(&self, room_id: &RoomId, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        let _ = self
            .room_locks
            .remove_if(room_id.as_str(), |_, held| Arc::strong_count(held) == 1);
    }

    /// Launch a collector for the session and record its handle.
    ///
    /// Any handle already recorded for the room rejects the start:
    /// [`SupervisorError::AlreadyRunning`] if its collector is alive,
    /// [`SupervisorError::Unstopped`] if it exited without a stop, since that
    /// session still has to be ended and archived. On spawn failure no
    /// handle is written.
    pub async fn start(&self, room_id: &RoomId, session_id: &SessionId) -> Result<CollectorHandle> {
        let lock = self.room_lock(room_id);
        let result = {
            let _guard = lock.lock().await;
            self.start_locked(room_id, session_id)
        };
        self.release_room_lock(room_id, lock);
        result
    }

    fn start_locked(&self, room_id: &RoomId, session_id: &SessionId) -> Result<CollectorHandle> {
        if let Some(existing) = self.handles.for_room(room_id)?.into_iter().next() {
            let (room, session) = (existing.room_id.to_string(), existing.session_id.to_string());
            if self.processes.is_alive(&existing.identity()) {
                return Err(SupervisorError::AlreadyRunning {
                    room_id: room,
                    session_id: session,
                });
            }
            warn!(
                room_id = %existing.room_id,
                session_id = %existing.session_id,
                pid = existing.pid,
                "room has an exited collector that was never stopped"
            );
            return Err(SupervisorError::Unstopped {
                room_id: room,
                session_id: session,
            });
        }

        let pid = self.launcher.launch(ProcessRole::Collector, room_id, session_id)?;
        let identity = self
            .processes
            .identify(pid)
            .unwrap_or_else(|| ProcessIdentity::pid_only(pid));
        let handle = CollectorHandle::new(room_id.clone(), session_id.clone(), identity);

        if let Err(source) = self.handles.create(&handle) {
            let kill_sent = self.processes.kill(&identity);
            if kill_sent {
                error!(
                    room_id = %room_id,
                    session_id = %session_id,
                    pid,
                    error = %source,
                    "handle write failed, new collector killed"
                );
            } else {
                error!(
                    room_id = %room_id,
                    session_id = %session_id,
                    pid,
                    error = %source,
                    "handle write failed and the new collector could not be signalled, process is untracked"
                );
            }
            return Err(SupervisorError::HandleWrite { pid, kill_sent, source });
        }

        metrics::counter!(COLLECTORS_STARTED_TOTAL).increment(1);
        info!(room_id = %room_id, session_id = %session_id, pid, "collector started");
        Ok(handle)
    }

    /// Stop the session's collector.
    ///
    /// SIGTERM, then up to `poll_attempts` exit checks `poll_interval` apart,
    /// then SIGKILL and a final `kill_wait`. A process that survives SIGKILL
    /// is logged at error level and reported as [`StopOutcome::Leaked`]. The
    /// handle is removed in every case where one existed.
    pub async fn stop(&self, room_id: &RoomId, session_id: &SessionId) -> Result<StopOutcome> {
        let lock = self.room_lock(room_id);
        let result = {
            let _guard = lock.lock().await;
            self.stop_locked(room_id, session_id).await
        };
        self.release_room_lock(room_id, lock);
        result
    }

    async fn stop_locked(&self, room_id: &RoomId, session_id: &SessionId) -> Result<StopOutcome> {
        let Some(handle) = self.handles.load(room_id, session_id)? else {
            info!(room_id = %room_id, session_id = %session_id, "no collector recorded, nothing to stop");
            return Ok(StopOutcome::NotRunning);
        };

        let outcome = self.escalate(&handle).await;
        if let Err(e) = self.handles.remove(room_id, session_id) {
            warn!(room_id = %room_id, session_id = %session_id, error = %e, "handle removal failed");
        }

        metrics::counter!(COLLECTORS_STOPPED_TOTAL, "outcome" => outcome.as_str()).increment(1);
        info!(
            room_id = %room_id,
            session_id = %session_id,
            pid = handle.pid,
            outcome = outcome.as_str(),
            "collector stopped"
        );
        Ok(outcome)
    }

    async fn escalate(&self, handle: &CollectorHandle) -> StopOutcome {
        let identity = handle.identity();
        if !self.processes.is_alive(&identity) {
            return StopOutcome::AlreadyExited;
        }

        if !self.processes.terminate(&identity) {
            // Exited between the liveness check and the signal.
            return StopOutcome::AlreadyExited;
        }
        for _ in 0..self.timing.poll_attempts {
            tokio::time::sleep(self.timing.poll_interval).await;
            if !self.processes.is_alive(&identity) {
                return StopOutcome::Terminated;
            }
        }

        warn!(pid = handle.pid, room_id = %handle.room_id, "collector ignored SIGTERM, sending SIGKILL");
        if !self.processes.kill(&identity) {
            debug!(pid = handle.pid, room_id = %handle.room_id, "collector exited before SIGKILL");
            return StopOutcome::Terminated;
        }
        tokio::time::sleep(self.timing.kill_wait).await;
        if self.processes.is_alive(&identity) {
            error!(
                pid = handle.pid,
                room_id = %handle.room_id,
                session_id = %handle.session_id,
                "collector survived SIGKILL, process leaked"
            );
            return StopOutcome::Leaked;
        }
        StopOutcome::Killed
    }

    /// Launch the batch archiver for a session.
    pub fn launch_archiver(&self, room_id: &RoomId, session_id: &SessionId) -> Result<u32> {
        let pid = self.launcher.launch(ProcessRole::Archiver, room_id, session_id)?;
        metrics::counter!(ARCHIVERS_LAUNCHED_TOTAL).increment(1);
        Ok(pid)
    }

    /// Settle handles whose process is gone: launch the session's archiver,
    /// then remove the handle. Live processes are never signalled.
    ///
    /// The caller marks the returned `recovered` sessions ended.
    pub async fn reconcile(&self) -> std::result::Result<ReconcileReport, HandleError> {
        let mut report = ReconcileReport::default();
        for handle in self.handles.all()? {
            let lock = self.room_lock(&handle.room_id);
            let settled = {
                let _guard = lock.lock().await;
                self.settle_exited(&handle, &mut report)
            };
            self.release_room_lock(&handle.room_id, lock);
            settled?;
        }
        Ok(report)
    }

    fn settle_exited(
        &self,
        handle: &CollectorHandle,
        report: &mut ReconcileReport,
    ) -> std::result::Result<(), HandleError> {
        if self.processes.is_alive(&handle.identity()) {
            report.alive += 1;
            return Ok(());
        }
        if let Err(e) = self.launch_archiver(&handle.room_id, &handle.session_id) {
            warn!(
                room_id = %handle.room_id,
                session_id = %handle.session_id,
                error = %e,
                "archiver launch failed, keeping handle of exited collector"
            );
            report.pending += 1;
            return Ok(());
        }
        if self.handles.remove(&handle.room_id, &handle.session_id)? {
            info!(
                room_id = %handle.room_id,
                session_id = %handle.session_id,
                pid = handle.pid,
                "exited collector archived and its handle removed"
            );
        }
        report.recovered.push(handle.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use livetap_core::logging::test_utils::capture_logs;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ── Fakes ───────────────────────────────────────────────────────────────

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Behavior {
        /// Exits after this many liveness checks following SIGTERM.
        ExitsAfterTerm(u32),
        /// Ignores SIGTERM, dies on SIGKILL.
        NeedsKill,
        /// Survives everything.
        Unkillable,
        /// Ignores SIGTERM, then exits just before SIGKILL is sent.
        ExitsBeforeKill,
    }

    #[derive(Default)]
    struct FakeProc {
        alive: bool,
        behavior: Option<Behavior>,
        checks_since_term: Option<u32>,
        signals: Vec<&'static str>,
    }

    #[derive(Default)]
    struct FakeProcesses {
        procs: Mutex<HashMap<u32, FakeProc>>,
        next_behavior: Mutex<Option<Behavior>>,
    }

    impl FakeProcesses {
        fn spawned(&self, pid: u32) {
            let behavior = *self.next_behavior.lock();
            let _ = self.procs.lock().insert(
                pid,
                FakeProc {
                    alive: true,
                    behavior,
                    ..FakeProc::default()
                },
            );
        }

        fn set_behavior(&self, behavior: Behavior) {
            *self.next_behavior.lock() = Some(behavior);
        }

        fn exit(&self, pid: u32) {
            if let Some(p) = self.procs.lock().get_mut(&pid) {
                p.alive = false;
            }
        }

        fn signals(&self, pid: u32) -> Vec<&'static str> {
            self.procs.lock().get(&pid).map(|p| p.signals.clone()).unwrap_or_default()
        }
    }

    impl ProcessControl for FakeProcesses {
        fn identify(&self, pid: u32) -> Option<ProcessIdentity> {
            self.procs.lock().contains_key(&pid).then_some(ProcessIdentity {
                pid,
                started_at: Some(1_000 + u64::from(pid)),
            })
        }

        fn is_alive(&self, identity: &ProcessIdentity) -> bool {
            let mut procs = self.procs.lock();
            let Some(p) = procs.get_mut(&identity.pid) else {
                return false;
            };
            if let (Some(Behavior::ExitsAfterTerm(n)), Some(checks)) =
                (p.behavior, p.checks_since_term.as_mut())
            {
                *checks += 1;
                if *checks >= n {
                    p.alive = false;
                }
            }
            p.alive
        }

        fn terminate(&self, identity: &ProcessIdentity) -> bool {
            let mut procs = self.procs.lock();
            let Some(p) = procs.get_mut(&identity.pid).filter(|p| p.alive) else {
                return false;
            };
            p.signals.push("TERM");
            p.checks_since_term = Some(0);
            true
        }

        fn kill(&self, identity: &ProcessIdentity) -> bool {
            let mut procs = self.procs.lock();
            let Some(p) = procs.get_mut(&identity.pid).filter(|p| p.alive) else {
                return false;
            };
            if p.behavior == Some(Behavior::ExitsBeforeKill) {
                p.alive = false;
                return false;
            }
            p.signals.push("KILL");
            if p.behavior != Some(Behavior::Unkillable) {
                p.alive = false;
            }
            true
        }
    }

    struct FakeLauncher {
        next_pid: AtomicU32,
        processes: Arc<FakeProcesses>,
        fail: bool,
        fail_archiver: Mutex<bool>,
        /// Occupies the handle path of the next collector it launches.
        squat_in: Mutex<Option<HandleStore>>,
        launched: Mutex<Vec<(ProcessRole, String, String)>>,
    }

    impl Launcher for FakeLauncher {
        fn launch(&self, role: ProcessRole, room_id: &RoomId, session_id: &SessionId) -> Result<u32> {
            if self.fail || (role == ProcessRole::Archiver && *self.fail_archiver.lock()) {
                return Err(SupervisorError::Spawn {
                    role: role.as_str(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            self.processes.spawned(pid);
            if let Some(store) = self.squat_in.lock().take() {
                let path = store.path_for(room_id, session_id);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, b"{}").unwrap();
            }
            self.launched
                .lock()
                .push((role, room_id.to_string(), session_id.to_string()));
            Ok(pid)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        supervisor: Supervisor,
        processes: Arc<FakeProcesses>,
        launcher: Arc<FakeLauncher>,
    }

    fn fixture_with(fail: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let processes = Arc::new(FakeProcesses::default());
        let launcher = Arc::new(FakeLauncher {
            next_pid: AtomicU32::new(100),
            processes: Arc::clone(&processes),
            fail,
            fail_archiver: Mutex::new(false),
            squat_in: Mutex::new(None),
            launched: Mutex::new(Vec::new()),
        });
        let supervisor = Supervisor::new(
            HandleStore::new(dir.path()),
            launcher.clone(),
            processes.clone(),
            StopTiming::default(),
        );
        Fixture {
            _dir: dir,
            supervisor,
            processes,
            launcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(false)
    }

    fn ids(room: &str, session: &str) -> (RoomId, SessionId) {
        (RoomId::from(room), SessionId::from(session))
    }

    // ── Start ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_records_handle_with_identity() {
        let f = fixture();
        let (room, session) = ids("abc", "s1");

        let handle = f.supervisor.start(&room, &session).await.unwrap();

        assert_eq!(handle.pid, 100);
        assert_eq!(handle.process_started_at, Some(1_100));
        let stored = f.supervisor.handles().load(&room, &session).unwrap();
        assert_eq!(stored, Some(handle));
    }

    #[tokio::test]
    async fn second_start_for_live_room_is_rejected() {
        let f = fixture();
        let (room, s1) = ids("abc", "s1");
        let _ = f.supervisor.start(&room, &s1).await.unwrap();

        let err = f.supervisor.start(&room, &SessionId::from("s2")).await.unwrap_err();

        assert_matches!(err, SupervisorError::AlreadyRunning { ref session_id, .. } if session_id == "s1");
        assert_eq!(f.launcher.launched.lock().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_starts_launch_once() {
        let f = Arc::new(fixture());
        let (room, _) = ids("abc", "s1");

        let a = {
            let f = Arc::clone(&f);
            let room = room.clone();
            tokio::spawn(async move { f.supervisor.start(&room, &SessionId::from("s1")).await.is_ok() })
        };
        let b = {
            let f = Arc::clone(&f);
            let room = room.clone();
            tokio::spawn(async move { f.supervisor.start(&room, &SessionId::from("s2")).await.is_ok() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(a ^ b);
        assert_eq!(f.launcher.launched.lock().len(), 1);
    }

    #[tokio::test]
    async fn exited_but_unstopped_collector_blocks_new_start() {
        let f = fixture();
        let (room, s1) = ids("abc", "s1");
        let first = f.supervisor.start(&room, &s1).await.unwrap();
        f.processes.exit(first.pid);

        let err = f.supervisor.start(&room, &SessionId::from("s2")).await.unwrap_err();

        assert_matches!(err, SupervisorError::Unstopped { ref session_id, .. } if session_id == "s1");
        assert_eq!(f.supervisor.handles().for_room(&room).unwrap(), vec![first]);
        assert_eq!(f.launcher.launched.lock().len(), 1);
    }

    #[tokio::test]
    async fn start_succeeds_once_the_old_session_is_stopped() {
        let f = fixture();
        let (room, s1) = ids("abc", "s1");
        let first = f.supervisor.start(&room, &s1).await.unwrap();
        f.processes.exit(first.pid);
        assert_eq!(f.supervisor.stop(&room, &s1).await.unwrap(), StopOutcome::AlreadyExited);

        let second = f.supervisor.start(&room, &SessionId::from("s2")).await.unwrap();

        assert_eq!(f.supervisor.handles().for_room(&room).unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn handle_write_failure_kills_new_collector() {
        let (logs, _guard) = capture_logs();
        let f = fixture();
        *f.launcher.squat_in.lock() = Some(f.supervisor.handles().clone());
        let (room, session) = ids("abc", "s1");

        let err = f.supervisor.start(&room, &session).await.unwrap_err();

        assert_matches!(
            err,
            SupervisorError::HandleWrite { pid: 100, kill_sent: true, source: HandleError::Exists(_) }
        );
        assert_eq!(f.processes.signals(100), vec!["KILL"]);
        assert!(logs.has_event(tracing::Level::ERROR, "new collector killed"));
    }

    #[tokio::test]
    async fn handle_write_failure_reports_unsignalled_collector() {
        let (logs, _guard) = capture_logs();
        let f = fixture();
        f.processes.set_behavior(Behavior::ExitsBeforeKill);
        *f.launcher.squat_in.lock() = Some(f.supervisor.handles().clone());
        let (room, session) = ids("abc", "s1");

        let err = f.supervisor.start(&room, &session).await.unwrap_err();

        assert_matches!(err, SupervisorError::HandleWrite { kill_sent: false, .. });
        assert!(logs.has_event(tracing::Level::ERROR, "process is untracked"));
    }

    #[tokio::test]
    async fn spawn_failure_writes_no_handle() {
        let f = fixture_with(true);
        let (room, session) = ids("abc", "s1");

        let err = f.supervisor.start(&room, &session).await.unwrap_err();

        assert_matches!(err, SupervisorError::Spawn { .. });
        assert!(f.supervisor.handles().all().unwrap().is_empty());
    }

    // ── Stop ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_without_handle_is_noop() {
        let f = fixture();
        let (room, session) = ids("abc", "s1");
        assert_eq!(f.supervisor.stop(&room, &session).await.unwrap(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn stop_of_exited_collector_clears_handle() {
        let f = fixture();
        let (room, session) = ids("abc", "s1");
        let handle = f.supervisor.start(&room, &session).await.unwrap();
        f.processes.exit(handle.pid);

        assert_eq!(f.supervisor.stop(&room, &session).await.unwrap(), StopOutcome::AlreadyExited);
        assert!(f.processes.signals(handle.pid).is_empty());
        assert!(f.supervisor.handles().load(&room, &session).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_exit_after_term() {
        let f = fixture();
        f.processes.set_behavior(Behavior::ExitsAfterTerm(2));
        let (room, session) = ids("abc", "s1");
        let handle = f.supervisor.start(&room, &session).await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = f.supervisor.stop(&room, &session).await.unwrap();

        assert_eq!(outcome, StopOutcome::Terminated);
        assert_eq!(f.processes.signals(handle.pid), vec!["TERM"]);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(f.supervisor.handles().load(&room, &session).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn escalates_to_kill_after_four_polls() {
        let f = fixture();
        f.processes.set_behavior(Behavior::NeedsKill);
        let (room, session) = ids("abc", "s1");
        let handle = f.supervisor.start(&room, &session).await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = f.supervisor.stop(&room, &session).await.unwrap();

        assert_eq!(outcome, StopOutcome::Killed);
        assert_eq!(f.processes.signals(handle.pid), vec!["TERM", "KILL"]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn unkillable_collector_is_logged_as_leak() {
        let (logs, _guard) = capture_logs();
        let f = fixture();
        f.processes.set_behavior(Behavior::Unkillable);
        let (room, session) = ids("abc", "s1");
        let handle = f.supervisor.start(&room, &session).await.unwrap();

        let outcome = f.supervisor.stop(&room, &session).await.unwrap();

        assert_eq!(outcome, StopOutcome::Leaked);
        assert!(logs.has_event(tracing::Level::ERROR, "process leaked"));
        let leak = logs
            .events()
            .into_iter()
            .find(|e| e.message.contains("leaked"))
            .unwrap();
        assert_eq!(leak.field("pid"), Some(handle.pid.to_string().as_str()));
        assert!(f.supervisor.handles().load(&room, &session).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn exit_just_before_kill_counts_as_terminated() {
        let f = fixture();
        f.processes.set_behavior(Behavior::ExitsBeforeKill);
        let (room, session) = ids("abc", "s1");
        let handle = f.supervisor.start(&room, &session).await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = f.supervisor.stop(&room, &session).await.unwrap();

        assert_eq!(outcome, StopOutcome::Terminated);
        assert_eq!(f.processes.signals(handle.pid), vec!["TERM"]);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn room_locks_are_released_after_use() {
        let f = fixture();
        let (room, session) = ids("abc", "s1");
        let _ = f.supervisor.start(&room, &session).await.unwrap();
        assert!(f.supervisor.room_locks.is_empty());

        let _ = f.supervisor.stop(&room, &session).await.unwrap();
        assert!(f.supervisor.room_locks.is_empty());

        let _ = f.supervisor.stop(&RoomId::from("never-started"), &session).await.unwrap();
        assert!(f.supervisor.room_locks.is_empty());
    }

    #[tokio::test]
    async fn archiver_launch_uses_archive_role() {
        let f = fixture();
        let (room, session) = ids("abc", "s1");
        let _ = f.supervisor.launch_archiver(&room, &session).unwrap();
        assert_eq!(
            f.launcher.launched.lock()[0],
            (ProcessRole::Archiver, "abc".to_owned(), "s1".to_owned())
        );
    }

    // ── Reconcile ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn reconcile_archives_and_removes_only_dead_handles() {
        let f = fixture();
        let live = f.supervisor.start(&RoomId::from("a"), &SessionId::from("s1")).await.unwrap();
        let dead = f.supervisor.start(&RoomId::from("b"), &SessionId::from("s2")).await.unwrap();
        f.processes.exit(dead.pid);

        let report = f.supervisor.reconcile().await.unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                alive: 1,
                recovered: vec![dead],
                pending: 0,
            }
        );
        assert!(f.processes.signals(live.pid).is_empty());
        assert_eq!(f.supervisor.handles().all().unwrap(), vec![live]);
        assert_eq!(
            f.launcher.launched.lock().last().cloned(),
            Some((ProcessRole::Archiver, "b".to_owned(), "s2".to_owned()))
        );
        assert_eq!(f.supervisor.room_locks.len(), 0);
    }

    #[tokio::test]
    async fn reconcile_keeps_handle_when_archiver_cannot_launch() {
        let f = fixture();
        let (room, session) = ids("b", "s2");
        let dead = f.supervisor.start(&room, &session).await.unwrap();
        f.processes.exit(dead.pid);
        *f.launcher.fail_archiver.lock() = true;

        let report = f.supervisor.reconcile().await.unwrap();

        assert_eq!(report.pending, 1);
        assert!(report.recovered.is_empty());
        assert_eq!(f.supervisor.handles().load(&room, &session).unwrap(), Some(dead));
    }

    #[test]
    fn stop_outcome_wire_names() {
        assert_eq!(serde_json::to_value(StopOutcome::AlreadyExited).unwrap(), "already_exited");
        assert_eq!(StopOutcome::Leaked.as_str(), "leaked");
    }
}
