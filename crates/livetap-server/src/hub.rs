//! Live fan-out hub.
//!
//! Subscribers register under a room key or the global key. A publish
//! serializes the message once and offers it to every subscriber of the
//! message's room plus every global subscriber with a non-blocking
//! `try_send`. A subscriber whose queue is full or closed is evicted: it is
//! removed from the registry after the delivery pass and its eviction token
//! is cancelled so its session closes the socket.
//!
//! The registry is only touched under its lock and never while a send is
//! pending, so removal during a concurrent publish is safe.

use std::collections::HashMap;
use std::sync::Arc;

use livetap_core::{ConnectionId, LiveMessage, RoomId};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::{HUB_MESSAGES_PUBLISHED_TOTAL, HUB_SUBSCRIBERS_DROPPED_TOTAL, WS_CONNECTIONS_ACTIVE};

/// What a subscriber listens to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// One room.
    Room(RoomId),
    /// Every room.
    All,
}

impl SubscriptionKey {
    /// Room id, or `None` for the global key.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Room(room_id) => Some(room_id),
            Self::All => None,
        }
    }
}

/// One live subscriber.
pub struct LiveSubscriber {
    /// Connection id.
    pub id: ConnectionId,
    /// Registration key.
    pub key: SubscriptionKey,
    tx: mpsc::Sender<Arc<String>>,
    evicted: CancellationToken,
    last_pong: Mutex<Instant>,
}

impl LiveSubscriber {
    fn new(key: SubscriptionKey, queue: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let subscriber = Arc::new(Self {
            id: ConnectionId::new(),
            key,
            tx,
            evicted: CancellationToken::new(),
            last_pong: Mutex::new(Instant::now()),
        });
        (subscriber, rx)
    }

    /// Queue a message without waiting. `false` if full or closed.
    pub fn try_deliver(&self, message: Arc<String>) -> bool {
        self.tx.try_send(message).is_ok()
    }

    /// Cancelled once the hub has dropped this subscriber.
    pub fn evicted(&self) -> CancellationToken {
        self.evicted.clone()
    }

    /// Record keepalive activity.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last keepalive.
    pub fn silence(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

/// Delivery counts for one publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the message.
    pub delivered: usize,
    /// Subscribers evicted by this publish.
    pub dropped: usize,
}

type Registry = HashMap<SubscriptionKey, HashMap<ConnectionId, Arc<LiveSubscriber>>>;

/// Room-keyed subscriber registry with best-effort delivery.
pub struct FanoutHub {
    subscribers: RwLock<Registry>,
    queue: usize,
}

impl FanoutHub {
    /// Hub whose subscribers buffer up to `queue` messages each.
    pub fn new(queue: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue,
        }
    }

    /// Register a subscriber. The receiver yields serialized messages.
    pub fn subscribe(&self, key: SubscriptionKey) -> (Arc<LiveSubscriber>, mpsc::Receiver<Arc<String>>) {
        let (subscriber, rx) = LiveSubscriber::new(key.clone(), self.queue);
        let _ = self
            .subscribers
            .write()
            .entry(key)
            .or_default()
            .insert(subscriber.id.clone(), Arc::clone(&subscriber));
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        debug!(connection_id = %subscriber.id, key = ?subscriber.key, "subscriber registered");
        (subscriber, rx)
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, subscriber: &LiveSubscriber) -> bool {
        let removed = remove(&mut self.subscribers.write(), &subscriber.key, &subscriber.id);
        if removed {
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        }
        removed
    }

    /// Deliver a message to its room's subscribers and all global subscribers.
    pub fn publish(&self, message: &LiveMessage) -> PublishReport {
        let payload = match serde_json::to_string(message) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize live message");
                return PublishReport::default();
            }
        };
        counter!(HUB_MESSAGES_PUBLISHED_TOTAL, "kind" => message.kind()).increment(1);
        self.publish_raw(message.room_id(), &payload)
    }

    /// Deliver an already serialized payload.
    pub fn publish_raw(&self, room_id: &RoomId, payload: &Arc<String>) -> PublishReport {
        let room_key = SubscriptionKey::Room(room_id.clone());
        let mut report = PublishReport::default();
        let mut failed: Vec<Arc<LiveSubscriber>> = Vec::new();

        {
            let registry = self.subscribers.read();
            let targets = [registry.get(&room_key), registry.get(&SubscriptionKey::All)];
            for subscriber in targets.into_iter().flatten().flat_map(HashMap::values) {
                if subscriber.try_deliver(Arc::clone(payload)) {
                    report.delivered += 1;
                } else {
                    failed.push(Arc::clone(subscriber));
                }
            }
        }

        if !failed.is_empty() {
            let mut registry = self.subscribers.write();
            for subscriber in &failed {
                if remove(&mut registry, &subscriber.key, &subscriber.id) {
                    report.dropped += 1;
                    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
                    counter!(HUB_SUBSCRIBERS_DROPPED_TOTAL).increment(1);
                    warn!(connection_id = %subscriber.id, room_id = %room_id, "subscriber dropped after failed delivery");
                }
                subscriber.evicted.cancel();
            }
        }

        debug!(room_id = %room_id, delivered = report.delivered, dropped = report.dropped, "live message fanned out");
        report
    }

    /// Total registered subscribers.
    pub fn connection_count(&self) -> usize {
        self.subscribers.read().values().map(HashMap::len).sum()
    }

    /// Rooms with at least one subscriber.
    pub fn room_count(&self) -> usize {
        self.subscribers
            .read()
            .keys()
            .filter(|k| matches!(k, SubscriptionKey::Room(_)))
            .count()
    }

    /// Subscribers registered under `key`.
    pub fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.subscribers.read().get(key).map_or(0, HashMap::len)
    }
}

fn remove(registry: &mut Registry, key: &SubscriptionKey, id: &ConnectionId) -> bool {
    let Some(group) = registry.get_mut(key) else {
        return false;
    };
    let removed = group.remove(id).is_some();
    if group.is_empty() {
        let _ = registry.remove(key);
    }
    removed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
