//! Relay bridge: live messages from collector processes into the hub.
//!
//! Collectors run in their own processes and publish over the live relay.
//! The bridge holds one subscription for every room and republishes each
//! message through [`FanoutHub::publish`]. A dropped subscription is
//! re-established after a fixed delay until shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livetap_core::LiveMessage;
use livetap_store::{RedisLiveSubscriber, RelayError};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::FanoutHub;
use crate::metrics::RELAY_RECONNECTS_TOTAL;

/// Delay between relay subscription attempts.
pub const DEFAULT_RELAY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// A cross-process stream of live messages.
#[async_trait]
pub trait LiveFeed: Send + Sync {
    /// Hand every message to `sink` until `cancel` fires or the feed fails.
    async fn run(
        &self,
        cancel: CancellationToken,
        sink: &mut (dyn FnMut(LiveMessage) + Send),
    ) -> Result<(), RelayError>;
}

#[async_trait]
impl LiveFeed for RedisLiveSubscriber {
    async fn run(
        &self,
        cancel: CancellationToken,
        sink: &mut (dyn FnMut(LiveMessage) + Send),
    ) -> Result<(), RelayError> {
        RedisLiveSubscriber::run(self, cancel, |message| sink(message)).await
    }
}

/// Forward `feed` into `hub` until `cancel` fires.
pub async fn run_relay_bridge(
    feed: Arc<dyn LiveFeed>,
    hub: Arc<FanoutHub>,
    retry_delay: Duration,
    cancel: CancellationToken,
) {
    let mut sink = |message: LiveMessage| {
        let _ = hub.publish(&message);
    };

    loop {
        let result = feed.run(cancel.clone(), &mut sink).await;
        if cancel.is_cancelled() {
            break;
        }
        match result {
            Ok(()) => warn!("live relay ended unexpectedly, resubscribing"),
            Err(e) => warn!(error = %e, delay = ?retry_delay, "live relay failed, resubscribing"),
        }
        counter!(RELAY_RECONNECTS_TOTAL).increment(1);

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(retry_delay) => {}
        }
    }
    info!("live relay bridge stopped");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
