//! Broker bridge: optional cross-process fan-out through the shared store.
//!
//! Outbound, every published envelope is wrapped in a wire frame carrying
//! the publishing bus instance's id and broadcast on `events:{topic}`.
//! Inbound, a pattern subscription on `events:*` feeds remote envelopes
//! straight into the local dispatcher; frames carrying our own origin are
//! dropped because the local dispatcher already ran for them.
//!
//! The bridge is strictly best-effort: an unreachable or timed-out store is
//! logged and skipped, and never surfaces to the publisher.

use std::sync::Arc;

use futures_util::future::join_all;
use lattice_core::Envelope;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use crate::store::StoreHandle;

/// Cross-process wire frame.
#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    /// Bus instance id of the publisher, used for echo suppression.
    origin: String,
    event: Envelope,
}

/// Connects the local bus to the shared pub/sub store.
pub struct BrokerBridge {
    store: StoreHandle,
    instance_id: String,
    channel_prefix: String,
}

impl BrokerBridge {
    #[must_use]
    pub fn new(store: StoreHandle, instance_id: String, channel_prefix: String) -> Self {
        Self {
            store,
            instance_id,
            channel_prefix,
        }
    }

    fn channel(&self, topic: &str) -> String {
        format!("{}{topic}", self.channel_prefix)
    }

    fn frame(&self, event: &Envelope) -> Option<String> {
        let frame = WireFrame {
            origin: self.instance_id.clone(),
            event: event.clone(),
        };
        match serde_json::to_string(&frame) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "failed to encode broker frame");
                None
            }
        }
    }

    /// Broadcasts one envelope. Failures are logged and absorbed.
    pub async fn broadcast(&self, event: &Envelope) {
        let Some(payload) = self.frame(event) else {
            return;
        };
        if let Err(err) = self.store.publish(&self.channel(&event.event_type), &payload).await {
            warn!(
                event_id = %event.id,
                topic = %event.event_type,
                correlation_id = %event.correlation_id,
                error = %err,
                "broker broadcast skipped, store unreachable"
            );
        }
    }

    /// Broadcasts a batch with the store publishes pipelined concurrently.
    /// Partial failure does not roll back already-broadcast events.
    pub async fn broadcast_all(&self, events: &[Envelope]) {
        join_all(events.iter().map(|event| self.broadcast(event))).await;
    }

    /// Attaches the inbound subscription, feeding remote envelopes into the
    /// dispatcher. A failed subscription degrades to local-only operation.
    pub async fn attach(&self, dispatcher: Arc<Dispatcher>) {
        let origin = self.instance_id.clone();
        let pattern = format!("{}*", self.channel_prefix);

        let callback = Arc::new(move |channel: String, payload: String| {
            let frame: WireFrame = match serde_json::from_str(&payload) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(channel, error = %err, "dropping malformed broker frame");
                    return;
                }
            };
            if frame.origin == origin {
                // Our own publish echoed back; local dispatch already ran.
                return;
            }
            debug!(
                event_id = %frame.event.id,
                topic = %frame.event.event_type,
                "dispatching remote event"
            );
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(&frame.event).await;
            });
        });

        if let Err(err) = self.store.subscribe_pattern(&pattern, callback).await {
            warn!(
                pattern,
                error = %err,
                "broker subscription failed, continuing local-only"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
