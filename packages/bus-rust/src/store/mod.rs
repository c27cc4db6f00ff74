//! Coordination store abstraction.
//!
//! The bus and registry coordinate across processes through a shared
//! external pub/sub + key-value store, consumed only through the
//! [`CoordinationStore`] trait. Any backend exposing channel pub/sub,
//! TTL-bounded keys, and membership sets is a valid implementation; the
//! in-memory [`MemoryStore`] serves tests and single-process deployments.
//!
//! Every call made by the runtime goes through [`StoreHandle`], which
//! applies a bounded timeout so a hung backend reads as a failure.

mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;

/// Errors from the external coordination store.
///
/// All variants are transient from the caller's point of view: the bus and
/// registry log them and degrade to local-only / best-effort behavior.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is down or refusing connections.
    #[error("coordination store unavailable")]
    Unavailable,
    /// The call exceeded its bounded timeout.
    #[error("coordination store call timed out after {0:?}")]
    Timeout(Duration),
    /// Backend-specific failure.
    #[error("coordination store backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Callback invoked for each message delivered to a pattern subscription.
/// Receives the concrete channel name and the raw payload.
pub type PatternCallback = Arc<dyn Fn(String, String) + Send + Sync>;

/// Abstract pub/sub + key-value + set-membership capability.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Publishes a payload to a channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribes to all channels matching a pattern (`*` suffix wildcard
    /// or global `*`). The callback runs for every delivered message.
    async fn subscribe_pattern(
        &self,
        pattern: &str,
        callback: PatternCallback,
    ) -> Result<(), StoreError>;

    /// Writes a key with a lease; the key reads as absent once the lease lapses.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Reads a key. Expired or never-written keys return `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes a key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Adds a member to a set.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Removes a member from a set. Removing an absent member succeeds.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Lists the members of a set. Absent sets are empty.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// StoreHandle
// ---------------------------------------------------------------------------

/// Shared store reference with a bounded per-call timeout.
///
/// Each call is individually guarded so one failure never cascades; callers
/// decide per call whether to log-and-continue.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn CoordinationStore>,
    timeout: Duration,
}

impl StoreHandle {
    /// Wraps a store with the given per-call timeout.
    #[must_use]
    pub fn new(inner: Arc<dyn CoordinationStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn guard<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.guard(self.inner.publish(channel, payload)).await
    }

    pub async fn subscribe_pattern(
        &self,
        pattern: &str,
        callback: PatternCallback,
    ) -> Result<(), StoreError> {
        self.guard(self.inner.subscribe_pattern(pattern, callback))
            .await
    }

    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.guard(self.inner.set_with_ttl(key, value, ttl)).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.guard(self.inner.get(key)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.guard(self.inner.delete(key)).await
    }

    pub async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.guard(self.inner.set_add(key, member)).await
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.guard(self.inner.set_remove(key, member)).await
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.guard(self.inner.set_members(key)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
