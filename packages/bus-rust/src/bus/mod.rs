//! Event bus: publish/subscribe with middleware, replay, and broker fan-out.
//!
//! Publish path: seal identity fields -> middleware pipeline (fatal on
//! error) -> replay buffer append -> best-effort broker broadcast -> local
//! dispatch (settle-all). Subscribers never observe a failure from another
//! handler, and the publisher never observes a store outage.

pub mod bridge;
pub mod dispatch;
pub mod middleware;
pub mod replay;

use std::sync::Arc;

use lattice_core::Envelope;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::error::BusError;
use crate::store::{CoordinationStore, StoreHandle};

use bridge::BrokerBridge;
use dispatch::Dispatcher;
pub use dispatch::{handler_fn, EventHandler};
pub use middleware::{EnsureCorrelation, EnsureEventId, EnsureTimestamp, Middleware};
use replay::ReplayBuffer;

/// In-process event bus with optional cross-process fan-out.
pub struct EventBus {
    config: BusConfig,
    dispatcher: Arc<Dispatcher>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    replay: ReplayBuffer,
    bridge: Option<BrokerBridge>,
}

impl EventBus {
    /// Creates a bus. With a store the broker bridge broadcasts every
    /// publish cross-process; without one the bus is local-only.
    #[must_use]
    pub fn new(config: BusConfig, store: Option<Arc<dyn CoordinationStore>>) -> Self {
        let bridge = store.map(|store| {
            BrokerBridge::new(
                StoreHandle::new(store, config.store_timeout),
                config.instance_id.clone(),
                config.channel_prefix.clone(),
            )
        });
        if bridge.is_none() {
            info!("no coordination store configured, event bus running local-only");
        }
        Self {
            replay: ReplayBuffer::new(config.replay_capacity),
            dispatcher: Arc::new(Dispatcher::new()),
            middleware: RwLock::new(Vec::new()),
            bridge,
            config,
        }
    }

    /// Attaches the inbound broker subscription. Without a store, or when
    /// the subscription fails, the bus simply stays local-only.
    pub async fn start(&self) {
        if let Some(bridge) = &self.bridge {
            bridge.attach(self.dispatcher.clone()).await;
        }
    }

    /// Unique id of this bus instance.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.config.instance_id
    }

    /// Appends a middleware to the pipeline (runs in registration order).
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware.write().push(middleware);
    }

    /// Registers a handler under a topic pattern (exact, `prefix.*`, or `*`).
    pub fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) {
        self.dispatcher.subscribe(pattern, handler);
    }

    /// Removes a previously registered handler.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn EventHandler>) {
        self.dispatcher.unsubscribe(pattern, handler);
    }

    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Only a failing middleware (a fatal configuration error) is returned.
    /// Store outages are logged and skipped; handler failures are isolated.
    pub async fn publish(&self, event: Envelope) -> Result<(), BusError> {
        let event = self.prepare(event).await?;
        self.replay.push(event.clone());
        debug!(
            event_id = %event.id,
            topic = %event.event_type,
            correlation_id = %event.correlation_id,
            source = %event.source,
            "event published"
        );

        if let Some(bridge) = &self.bridge {
            bridge.broadcast(&event).await;
        }
        self.dispatcher.dispatch(&event).await;
        Ok(())
    }

    /// Publishes a batch: middleware per event, broker publishes pipelined
    /// concurrently, then local dispatch per event. A middleware failure
    /// aborts the whole batch before any event is recorded, broadcast, or
    /// dispatched.
    pub async fn publish_batch(&self, events: Vec<Envelope>) -> Result<(), BusError> {
        let mut prepared = Vec::with_capacity(events.len());
        for event in events {
            prepared.push(self.prepare(event).await?);
        }
        for event in &prepared {
            self.replay.push(event.clone());
        }

        if let Some(bridge) = &self.bridge {
            bridge.broadcast_all(&prepared).await;
        }
        for event in &prepared {
            self.dispatcher.dispatch(event).await;
        }
        Ok(())
    }

    /// Returns up to `limit` most-recent published events, newest last.
    #[must_use]
    pub fn published_events(&self, limit: usize) -> Vec<Envelope> {
        self.replay.recent(limit)
    }

    /// Seals identity fields and runs the middleware pipeline, enforcing
    /// that no middleware overwrites a sealed field.
    async fn prepare(&self, mut event: Envelope) -> Result<Envelope, BusError> {
        event.seal();
        let sealed = (
            event.id.clone(),
            event.timestamp.clone(),
            event.correlation_id.clone(),
        );

        let pipeline = self.middleware.read().clone();
        for mw in &pipeline {
            let next = mw
                .process(event)
                .await
                .map_err(|err| BusError::middleware(mw.name(), err))?;
            if next.id != sealed.0
                || next.timestamp != sealed.1
                || next.correlation_id != sealed.2
            {
                warn!(
                    middleware = mw.name(),
                    event_id = %sealed.0,
                    "middleware overwrote sealed identity fields"
                );
                return Err(BusError::middleware(
                    mw.name(),
                    anyhow::anyhow!("middleware overwrote sealed identity fields"),
                ));
            }
            event = next;
        }
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
