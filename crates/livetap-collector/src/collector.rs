//! Per-session collector loop.
//!
//! A [`Collector`] owns one [`EventSource`] for one `(room_id, session_id)`.
//! Received events are normalized on the loop and handed to a single
//! writer task over an unbounded channel, which appends them to the
//! [`SessionBuffer`] in arrival order and publishes the matching
//! [`LiveMessage`]. The loop never awaits a buffer write.
//!
//! Shutdown is cooperative: cancelling the token passed to
//! [`Collector::run`] clears the accept flag, disconnects the source
//! within the grace period, and lets the writer flush what it already
//! accepted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use livetap_core::{
    CollectorStatus, LiveMessage, NormalizedEvent, RetryPolicy, RoomId, SessionId, normalize,
};
use livetap_store::{LivePublisher, SessionBuffer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{PlatformEvent, SourceEvent};
use crate::errors::{FailureClass, SourceError};
use crate::source::EventSource;
use crate::state::StateMachine;

/// Default bound on disconnect and flush at shutdown. Kept under the
/// supervisor's default SIGTERM window (4 × 500 ms).
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(1500);

/// Collector tuning.
#[derive(Clone, Copy, Debug)]
pub struct CollectorConfig {
    /// Reconnect policy for transient failures.
    pub retry: RetryPolicy,
    /// Total bound on graceful disconnect plus the final buffer flush.
    pub shutdown_grace: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// How a collector run finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectorOutcome {
    /// The broadcast ended.
    Ended,
    /// Unrecoverable failure.
    Failed {
        /// Operator-facing reason.
        reason: String,
    },
    /// Shut down on request.
    Stopped,
}

impl CollectorOutcome {
    /// Terminal status announced for this outcome.
    pub fn status(&self) -> CollectorStatus {
        match self {
            Self::Ended => CollectorStatus::Ended,
            Self::Failed { .. } => CollectorStatus::Failed,
            Self::Stopped => CollectorStatus::Stopped,
        }
    }

    /// Process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ended | Self::Stopped => 0,
            Self::Failed { .. } => 2,
        }
    }
}

/// Counters from the writer task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Events appended to the buffer.
    pub buffered: u64,
    /// Appends that failed.
    pub append_failures: u64,
    /// Live publishes that failed.
    pub publish_failures: u64,
}

/// Summary of a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorReport {
    /// How the run ended.
    pub outcome: CollectorOutcome,
    /// Events accepted from the source.
    pub received: u64,
    /// Events dropped because the stop flag was set.
    pub discarded: u64,
    /// Writer counters, if the writer finished within the grace period.
    pub writer: Option<WriterStats>,
}

enum Outbound {
    Event {
        event: NormalizedEvent,
        live: LiveMessage,
    },
    Status(LiveMessage),
}

enum PumpExit {
    Cancelled,
    LiveEnded,
    Failed(SourceError),
}

/// Collector for one session.
pub struct Collector<S> {
    room_id: RoomId,
    session_id: SessionId,
    source: S,
    buffer: Arc<dyn SessionBuffer>,
    publisher: Arc<dyn LivePublisher>,
    config: CollectorConfig,
    machine: StateMachine,
    accepting: Arc<AtomicBool>,
    received: u64,
    discarded: u64,
}

impl<S: EventSource> Collector<S> {
    /// Build a collector in the `Starting` state.
    pub fn new(
        room_id: RoomId,
        session_id: SessionId,
        source: S,
        buffer: Arc<dyn SessionBuffer>,
        publisher: Arc<dyn LivePublisher>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            room_id,
            session_id,
            source,
            buffer,
            publisher,
            config,
            machine: StateMachine::new(),
            accepting: Arc::new(AtomicBool::new(true)),
            received: 0,
            discarded: 0,
        }
    }

    /// Flag cleared when the collector stops accepting events.
    pub fn accept_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.accepting)
    }

    /// Current state.
    pub fn state(&self) -> CollectorStatus {
        self.machine.state()
    }

    /// Run until the broadcast ends, a terminal failure occurs, or `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> CollectorReport {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(
            self.room_id.clone(),
            self.session_id.clone(),
            Arc::clone(&self.buffer),
            Arc::clone(&self.publisher),
            rx,
        ));

        info!(room_id = %self.room_id, session_id = %self.session_id, "collector starting");
        self.announce(&tx, CollectorStatus::Starting, None);

        let outcome = self.drive(&tx, &cancel).await;
        self.stop_accepting();

        // One deadline covers disconnect and flush together.
        let grace = self.config.shutdown_grace;
        let deadline = tokio::time::Instant::now() + grace;
        match tokio::time::timeout_at(deadline, self.source.disconnect()).await {
            Ok(Ok(())) => debug!("source disconnected"),
            Ok(Err(e)) => warn!(error = %e, "source disconnect failed"),
            Err(_) => warn!(grace_ms = grace.as_millis(), "source disconnect timed out"),
        }

        let detail = match &outcome {
            CollectorOutcome::Failed { reason } => Some(reason.clone()),
            _ => None,
        };
        self.transition(&tx, outcome.status(), detail);
        drop(tx);

        let writer = match tokio::time::timeout_at(deadline, writer).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                error!(error = %e, "buffer writer task failed");
                None
            }
            Err(_) => {
                error!(grace_ms = grace.as_millis(), "buffer writer did not flush within grace period");
                None
            }
        };

        info!(
            room_id = %self.room_id,
            session_id = %self.session_id,
            outcome = ?outcome,
            received = self.received,
            discarded = self.discarded,
            "collector finished"
        );

        CollectorReport {
            outcome,
            received: self.received,
            discarded: self.discarded,
            writer,
        }
    }

    async fn drive(
        &mut self,
        tx: &mpsc::UnboundedSender<Outbound>,
        cancel: &CancellationToken,
    ) -> CollectorOutcome {
        let retry = self.config.retry;
        let mut attempt: u32 = 0;
        self.transition(tx, CollectorStatus::Connecting, None);

        loop {
            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => return CollectorOutcome::Stopped,
                result = self.source.connect(&self.room_id) => result,
            };

            let failure = match connected {
                Ok(()) => {
                    attempt = 0;
                    self.transition(tx, CollectorStatus::Connected, None);
                    match self.pump(tx, cancel).await {
                        PumpExit::Cancelled => return CollectorOutcome::Stopped,
                        PumpExit::LiveEnded => return CollectorOutcome::Ended,
                        PumpExit::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            match failure.class() {
                FailureClass::Ended => {
                    info!(room_id = %self.room_id, reason = %failure, "broadcast over");
                    return CollectorOutcome::Ended;
                }
                FailureClass::SignService => {
                    error!(room_id = %self.room_id, error = %failure, "signing service failure");
                    return CollectorOutcome::Failed {
                        reason: failure.to_string(),
                    };
                }
                FailureClass::Transient => {
                    attempt += 1;
                    if !retry.allows(attempt) {
                        warn!(room_id = %self.room_id, error = %failure, "reconnect attempts exhausted");
                        return CollectorOutcome::Failed {
                            reason: format!(
                                "reconnect attempts exhausted ({}): {failure}",
                                retry.max_retries
                            ),
                        };
                    }
                    warn!(room_id = %self.room_id, attempt, error = %failure, "transient source failure");
                    self.transition(
                        tx,
                        CollectorStatus::Reconnecting,
                        Some(format!("{}: {failure}", retry.describe(attempt))),
                    );
                    if let Err(e) = self.source.disconnect().await {
                        warn!(room_id = %self.room_id, error = %e, "disconnect before retry failed");
                    }
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return CollectorOutcome::Stopped,
                        () = tokio::time::sleep(retry.delay()) => {}
                    }
                }
            }
        }
    }

    async fn pump(
        &mut self,
        tx: &mpsc::UnboundedSender<Outbound>,
        cancel: &CancellationToken,
    ) -> PumpExit {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.stop_accepting();
                    return PumpExit::Cancelled;
                }
                next = self.source.next_event() => next,
            };
            match next {
                Ok(event) => {
                    let ended = event.is_live_end();
                    self.accept(tx, &event);
                    if ended {
                        return PumpExit::LiveEnded;
                    }
                }
                Err(e) => return PumpExit::Failed(e),
            }
        }
    }

    fn accept(&mut self, tx: &mpsc::UnboundedSender<Outbound>, event: &SourceEvent) {
        if !self.accepting.load(Ordering::Acquire) {
            self.discarded += 1;
            debug!(kind = %event.kind, "collector stopping, event discarded");
            return;
        }
        let normalized = normalize(&event.kind, &event.raw);
        let live = live_message(&self.room_id, event, &normalized);
        if tx.send(Outbound::Event { event: normalized, live }).is_err() {
            error!(kind = %event.kind, "buffer writer gone, event lost");
            return;
        }
        self.received += 1;
    }

    fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    fn transition(
        &mut self,
        tx: &mpsc::UnboundedSender<Outbound>,
        to: CollectorStatus,
        detail: Option<String>,
    ) {
        match self.machine.advance(to) {
            Ok(from) => {
                info!(
                    room_id = %self.room_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    detail = detail.as_deref().unwrap_or(""),
                    "collector state"
                );
                self.announce(tx, to, detail);
            }
            Err(e) => warn!(error = %e, "ignored collector transition"),
        }
    }

    fn announce(
        &self,
        tx: &mpsc::UnboundedSender<Outbound>,
        status: CollectorStatus,
        detail: Option<String>,
    ) {
        let message = LiveMessage::status(self.room_id.clone(), self.session_id.clone(), status, detail);
        let _ = tx.send(Outbound::Status(message));
    }
}

/// Map a source event onto the live message viewers receive.
pub fn live_message(room_id: &RoomId, event: &SourceEvent, normalized: &NormalizedEvent) -> LiveMessage {
    let timestamp = normalized.timestamp;
    match &event.typed {
        Some(PlatformEvent::Comment { user, comment }) => LiveMessage::Chat {
            room_id: room_id.clone(),
            user_nickname: user.nickname.clone(),
            content: comment.clone(),
            timestamp,
        },
        Some(PlatformEvent::Gift {
            user,
            gift,
            repeat_count,
            ..
        }) => LiveMessage::gift(
            room_id.clone(),
            user.nickname.clone(),
            gift.name.clone(),
            gift.diamond_count,
            *repeat_count,
            timestamp,
        ),
        Some(PlatformEvent::Like { user, count, .. }) => LiveMessage::Like {
            room_id: room_id.clone(),
            user_nickname: user.nickname.clone(),
            count: *count,
            timestamp,
        },
        _ => LiveMessage::Event {
            room_id: room_id.clone(),
            event: normalized.clone(),
        },
    }
}

async fn write_loop(
    room_id: RoomId,
    session_id: SessionId,
    buffer: Arc<dyn SessionBuffer>,
    publisher: Arc<dyn LivePublisher>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> WriterStats {
    let mut stats = WriterStats::default();
    while let Some(item) = rx.recv().await {
        let live = match item {
            Outbound::Event { event, live } => {
                match buffer.append(&room_id, &session_id, &event).await {
                    Ok(()) => stats.buffered += 1,
                    Err(e) => {
                        stats.append_failures += 1;
                        error!(
                            room_id = %room_id,
                            session_id = %session_id,
                            event_type = %event.event_type,
                            error = %e,
                            "buffer append failed"
                        );
                    }
                }
                live
            }
            Outbound::Status(live) => live,
        };
        if let Err(e) = publisher.publish(&live).await {
            stats.publish_failures += 1;
            warn!(room_id = %room_id, kind = live.kind(), error = %e, "live publish failed");
        }
    }
    stats
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EventCatalog;
    use crate::errors::SourceError;
    use async_trait::async_trait;
    use livetap_core::logging::test_utils::capture_logs;
    use livetap_store::{BufferError, InMemorySessionBuffer, RelayError};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    // ── Test doubles ────────────────────────────────────────────────────────

    #[derive(Default)]
    struct ScriptedSource {
        connects: VecDeque<Result<(), SourceError>>,
        events: VecDeque<Result<SourceEvent, SourceError>>,
        disconnect_failures: VecDeque<SourceError>,
        disconnect_hangs: bool,
        disconnects: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn connect_ok(mut self) -> Self {
            self.connects.push_back(Ok(()));
            self
        }

        fn connect_err(mut self, err: SourceError) -> Self {
            self.connects.push_back(Err(err));
            self
        }

        fn frame(mut self, text: &str) -> Self {
            let event = EventCatalog::default().decode(text).unwrap();
            self.events.push_back(Ok(event));
            self
        }

        fn drop_stream(mut self, err: SourceError) -> Self {
            self.events.push_back(Err(err));
            self
        }

        fn failing_disconnect(mut self, err: SourceError) -> Self {
            self.disconnect_failures.push_back(err);
            self
        }

        fn hanging_disconnect(mut self) -> Self {
            self.disconnect_hangs = true;
            self
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn is_live(&self, _room_id: &RoomId) -> Result<bool, SourceError> {
            Ok(true)
        }

        async fn connect(&mut self, _room_id: &RoomId) -> Result<(), SourceError> {
            self.connects
                .pop_front()
                .unwrap_or_else(|| Err(SourceError::Connection("script exhausted".into())))
        }

        async fn next_event(&mut self) -> Result<SourceEvent, SourceError> {
            match self.events.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }

        async fn disconnect(&mut self) -> Result<(), SourceError> {
            let _ = self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.disconnect_hangs {
                std::future::pending::<()>().await;
            }
            match self.disconnect_failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    /// Buffer whose appends never complete.
    struct StuckBuffer;

    #[async_trait]
    impl SessionBuffer for StuckBuffer {
        async fn append(&self, _: &RoomId, _: &SessionId, _: &NormalizedEvent) -> Result<(), BufferError> {
            std::future::pending().await
        }

        async fn snapshot(&self, _: &RoomId, _: &SessionId) -> Result<Vec<NormalizedEvent>, BufferError> {
            Ok(Vec::new())
        }

        async fn clear(&self, _: &RoomId, _: &SessionId, _: usize) -> Result<(), BufferError> {
            Ok(())
        }

        async fn len(&self, _: &RoomId, _: &SessionId) -> Result<usize, BufferError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        messages: Mutex<Vec<LiveMessage>>,
    }

    impl RecordingPublisher {
        fn statuses(&self) -> Vec<CollectorStatus> {
            self.messages
                .lock()
                .iter()
                .filter_map(|m| match m {
                    LiveMessage::Status { status, .. } => Some(*status),
                    _ => None,
                })
                .collect()
        }

        fn kinds(&self) -> Vec<&'static str> {
            self.messages.lock().iter().map(LiveMessage::kind).collect()
        }
    }

    #[async_trait]
    impl LivePublisher for RecordingPublisher {
        async fn publish(&self, message: &LiveMessage) -> Result<(), RelayError> {
            self.messages.lock().push(message.clone());
            Ok(())
        }
    }

    struct Harness {
        buffer: Arc<InMemorySessionBuffer>,
        publisher: Arc<RecordingPublisher>,
        room: RoomId,
        session: SessionId,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                buffer: Arc::new(InMemorySessionBuffer::new()),
                publisher: Arc::new(RecordingPublisher::default()),
                room: RoomId::from("abc"),
                session: SessionId::from("s1"),
            }
        }

        fn collector(&self, source: ScriptedSource) -> Collector<ScriptedSource> {
            Collector::new(
                self.room.clone(),
                self.session.clone(),
                source,
                self.buffer.clone(),
                self.publisher.clone(),
                CollectorConfig::default(),
            )
        }

        async fn buffered_types(&self) -> Vec<String> {
            self.buffer
                .snapshot(&self.room, &self.session)
                .await
                .unwrap()
                .into_iter()
                .map(|e| e.event_type)
                .collect()
        }
    }

    const COMMENT: &str = r#"{"type":"comment","user":{"nickname":"a","_token":"x"},"comment":"hi"}"#;
    const GIFT: &str = r#"{"type":"gift","user":{"nickname":"b"},"gift":{"name":"Lion","diamond_count":100},"repeat_count":50}"#;
    const LIVE_END: &str = r#"{"type":"live_end"}"#;

    use CollectorStatus::{Connected, Connecting, Ended, Failed, Reconnecting, Starting, Stopped};

    // ── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn buffers_events_in_order_and_ends_with_broadcast() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_ok()
            .frame(COMMENT)
            .frame(GIFT)
            .frame(LIVE_END);

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert_eq!(report.outcome, CollectorOutcome::Ended);
        assert_eq!(report.received, 3);
        assert_eq!(report.writer.unwrap().buffered, 3);
        assert_eq!(h.buffered_types().await, vec!["comment", "gift", "live_end"]);
        assert_eq!(h.publisher.statuses(), vec![Starting, Connecting, Connected, Ended]);
    }

    #[tokio::test]
    async fn normalized_payload_drops_private_fields() {
        let h = Harness::new();
        let source = ScriptedSource::default().connect_ok().frame(COMMENT).frame(LIVE_END);
        let _ = h.collector(source).run(CancellationToken::new()).await;

        let events = h.buffer.snapshot(&h.room, &h.session).await.unwrap();
        assert_eq!(events[0].data["user"]["nickname"], "a");
        assert!(events[0].data["user"].get("_token").is_none());
    }

    #[tokio::test]
    async fn gifts_are_published_with_tier() {
        let h = Harness::new();
        let source = ScriptedSource::default().connect_ok().frame(GIFT).frame(LIVE_END);
        let _ = h.collector(source).run(CancellationToken::new()).await;

        let messages = h.publisher.messages.lock().clone();
        let gift = messages
            .iter()
            .find_map(|m| match m {
                LiveMessage::Gift { value, tier, motion_tag, .. } => Some((*value, tier.level(), motion_tag.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(gift, (5000, 7, "gift_level_7".to_string()));
        assert!(h.publisher.kinds().contains(&"event"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_connect_failures_are_retried() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_err(SourceError::Connection("reset".into()))
            .connect_err(SourceError::Closed)
            .connect_ok()
            .frame(LIVE_END);

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert_eq!(report.outcome, CollectorOutcome::Ended);
        assert_eq!(
            h.publisher.statuses(),
            vec![Starting, Connecting, Reconnecting, Reconnecting, Connected, Ended]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_without_panicking() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_err(SourceError::Closed)
            .connect_err(SourceError::Closed)
            .connect_err(SourceError::Closed);

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert!(matches!(report.outcome, CollectorOutcome::Failed { ref reason } if reason.contains("exhausted")));
        assert_eq!(report.outcome.exit_code(), 2);
        assert_eq!(
            h.publisher.statuses(),
            vec![Starting, Connecting, Reconnecting, Reconnecting, Failed]
        );

        let details: Vec<String> = h
            .publisher
            .messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                LiveMessage::Status { status: Reconnecting, detail, .. } => detail.clone(),
                _ => None,
            })
            .collect();
        assert!(details[0].starts_with("attempt 1/2"));
        assert!(details[1].starts_with("attempt 2/2"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_disconnect_before_retry_is_logged() {
        let (logs, _guard) = capture_logs();
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_err(SourceError::Closed)
            .connect_ok()
            .frame(LIVE_END)
            .failing_disconnect(SourceError::Connection("socket already gone".into()));

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert_eq!(report.outcome, CollectorOutcome::Ended);
        assert!(logs.has_event(tracing::Level::WARN, "disconnect before retry failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_grace_bounds_disconnect_and_flush_together() {
        let room = RoomId::from("abc");
        let grace = Duration::from_secs(1);
        let source = ScriptedSource::default()
            .connect_ok()
            .frame(COMMENT)
            .hanging_disconnect();
        let collector = Collector::new(
            room,
            SessionId::from("s1"),
            source,
            Arc::new(StuckBuffer),
            Arc::new(RecordingPublisher::default()),
            CollectorConfig {
                shutdown_grace: grace,
                ..CollectorConfig::default()
            },
        );

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        }));

        let started = tokio::time::Instant::now();
        let report = collector.run(cancel).await;

        assert_eq!(report.outcome, CollectorOutcome::Stopped);
        assert!(report.writer.is_none());
        assert_eq!(started.elapsed(), Duration::from_millis(100) + grace);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_resets_after_reconnect() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_ok()
            .drop_stream(SourceError::Closed)
            .connect_err(SourceError::Closed)
            .connect_ok()
            .drop_stream(SourceError::Closed)
            .connect_err(SourceError::Closed)
            .connect_ok()
            .frame(LIVE_END);

        let report = h.collector(source).run(CancellationToken::new()).await;
        assert_eq!(report.outcome, CollectorOutcome::Ended);
    }

    #[tokio::test]
    async fn sign_service_failure_is_terminal() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_err(SourceError::SignService("platform answered 403".into()));

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert!(matches!(report.outcome, CollectorOutcome::Failed { ref reason } if reason.contains("signing")));
        assert_eq!(h.publisher.statuses(), vec![Starting, Connecting, Failed]);
    }

    #[tokio::test]
    async fn offline_room_ends_cleanly() {
        let h = Harness::new();
        let source = ScriptedSource::default().connect_err(SourceError::Offline);

        let report = h.collector(source).run(CancellationToken::new()).await;

        assert_eq!(report.outcome, CollectorOutcome::Ended);
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(h.publisher.statuses(), vec![Starting, Connecting, Ended]);
    }

    #[tokio::test]
    async fn cancellation_stops_and_flushes_accepted_events() {
        let h = Harness::new();
        let disconnects = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            disconnects: Arc::clone(&disconnects),
            ..ScriptedSource::default()
        }
        .connect_ok()
        .frame(COMMENT);

        let cancel = CancellationToken::new();
        let collector = h.collector(source);
        let flag = collector.accept_flag();
        let run = tokio::spawn(collector.run(cancel.clone()));

        // Let the loop consume the one scripted frame and park on the source.
        while h.buffer.len(&h.room, &h.session).await.unwrap() == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        let report = run.await.unwrap();

        assert_eq!(report.outcome, CollectorOutcome::Stopped);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(disconnects.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.buffered_types().await, vec!["comment"]);
        assert_eq!(h.publisher.statuses(), vec![Starting, Connecting, Connected, Stopped]);
    }

    #[tokio::test]
    async fn events_after_stop_flag_are_discarded() {
        let h = Harness::new();
        let source = ScriptedSource::default()
            .connect_ok()
            .frame(COMMENT)
            .frame(LIVE_END);
        let collector = h.collector(source);
        collector.accept_flag().store(false, Ordering::SeqCst);

        let report = collector.run(CancellationToken::new()).await;

        assert_eq!(report.received, 0);
        assert_eq!(report.discarded, 2);
        assert!(h.buffered_types().await.is_empty());
    }

    #[test]
    fn outcome_status_mapping() {
        assert_eq!(CollectorOutcome::Ended.status(), Ended);
        assert_eq!(CollectorOutcome::Stopped.status(), Stopped);
        assert_eq!(
            CollectorOutcome::Failed { reason: String::new() }.status(),
            Failed
        );
    }
}
