//! Local subscriber dispatch.
//!
//! Handlers are keyed by topic pattern (exact, prefix wildcard, or global).
//! A publish fans out to every matching handler as an independent spawned
//! task, then awaits them all (settle-all): a slow handler cannot block a
//! fast one, and a failing or panicking handler never affects its siblings
//! or the publisher. No ordering is guaranteed across pattern classes.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use lattice_core::{Envelope, TopicPattern};
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// EventHandler
// ---------------------------------------------------------------------------

/// A subscriber callback.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one delivered envelope. Errors are logged, never propagated.
    async fn handle(&self, event: Envelope) -> anyhow::Result<()>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: Envelope) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}

/// Wraps an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct PatternEntry {
    pattern: TopicPattern,
    handlers: Vec<Arc<dyn EventHandler>>,
}

/// In-process fan-out by topic pattern.
#[derive(Default)]
pub struct Dispatcher {
    /// Pattern source text -> parsed pattern + handler set.
    subscriptions: DashMap<String, PatternEntry>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a pattern. Re-registering the same handler
    /// (by identity) under the same pattern is idempotent.
    pub fn subscribe(&self, pattern: &str, handler: Arc<dyn EventHandler>) {
        let mut entry = self
            .subscriptions
            .entry(pattern.to_string())
            .or_insert_with(|| PatternEntry {
                pattern: TopicPattern::parse(pattern),
                handlers: Vec::new(),
            });
        if !entry.handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            let wildcard = entry.pattern.is_wildcard();
            entry.handlers.push(handler);
            debug!(pattern, wildcard, "subscribed handler");
        }
    }

    /// Removes a handler (by identity) from a pattern. Removing the last
    /// handler frees the pattern entry. Unknown pattern/handler is a no-op.
    pub fn unsubscribe(&self, pattern: &str, handler: &Arc<dyn EventHandler>) {
        if let Some(mut entry) = self.subscriptions.get_mut(pattern) {
            entry.handlers.retain(|h| !Arc::ptr_eq(h, handler));
        }
        self.subscriptions
            .remove_if(pattern, |_, entry| entry.handlers.is_empty());
    }

    /// Number of handlers currently registered under a pattern.
    #[must_use]
    pub fn handler_count(&self, pattern: &str) -> usize {
        self.subscriptions
            .get(pattern)
            .map_or(0, |entry| entry.handlers.len())
    }

    fn matching_handlers(&self, topic: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers = Vec::new();
        for entry in &self.subscriptions {
            if entry.pattern.matches(topic) {
                handlers.extend(entry.handlers.iter().cloned());
            }
        }
        handlers
    }

    /// Fans the event out to every matching handler concurrently and awaits
    /// them all. Handler errors and panics are isolated and logged.
    pub async fn dispatch(&self, event: &Envelope) {
        let handlers = self.matching_handlers(&event.event_type);
        if handlers.is_empty() {
            return;
        }

        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                tokio::spawn(async move { handler.handle(event).await })
            })
            .collect();

        for outcome in join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        event_id = %event.id,
                        topic = %event.event_type,
                        correlation_id = %event.correlation_id,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(join_err) => {
                    error!(
                        event_id = %event.id,
                        topic = %event.event_type,
                        correlation_id = %event.correlation_id,
                        error = %join_err,
                        "event handler panicked"
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
