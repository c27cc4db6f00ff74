//! In-memory coordination store.
//!
//! Implements the full store capability in-process: TTL keys expire lazily
//! on read, membership sets live in a plain map, and pattern subscriptions
//! reuse the bus topic matcher. Intended for tests and single-process
//! deployments; the `set_unavailable` switch injects outages so degraded
//! paths can be exercised.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use lattice_core::TopicPattern;
use parking_lot::RwLock;

use super::{CoordinationStore, PatternCallback, StoreError};

/// A stored value with an optional lease deadline.
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// In-process store backing for tests and local runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    sets: RwLock<HashMap<String, BTreeSet<String>>>,
    subscriptions: RwLock<Vec<(TopicPattern, PatternCallback)>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a store outage: while set, every call fails with
    /// `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Force-expires a key, simulating a lapsed lease without waiting out
    /// the TTL.
    pub fn expire(&self, key: &str) {
        self.entries.remove(key);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let subscriptions = self.subscriptions.read().clone();
        for (pattern, callback) in &subscriptions {
            if pattern.matches(channel) {
                callback(channel.to_string(), payload.to_string());
            }
        }
        Ok(())
    }

    async fn subscribe_pattern(
        &self,
        pattern: &str,
        callback: PatternCallback,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.subscriptions
            .write()
            .push((TopicPattern::parse(pattern), callback));
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        // Lazy expiry: drop the entry on first read past its deadline.
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.sets
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut sets = self.sets.write();
        if let Some(set) = sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self
            .sets
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn set_get_round_trip_within_ttl() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("services:a", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("services:a").await.unwrap(), Some("{}".to_string()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("services:a", "{}", Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.get("services:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn force_expire_removes_key() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("health:a", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        store.expire("health:a");
        assert_eq!(store.get("health:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sets_track_membership() {
        let store = MemoryStore::new();
        store.set_add("service-names:doc", "a").await.unwrap();
        store.set_add("service-names:doc", "b").await.unwrap();
        store.set_add("service-names:doc", "a").await.unwrap();

        let members = store.set_members("service-names:doc").await.unwrap();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        store.set_remove("service-names:doc", "a").await.unwrap();
        assert_eq!(
            store.set_members("service-names:doc").await.unwrap(),
            vec!["b".to_string()]
        );

        // Removing an absent member is a no-op success.
        store.set_remove("service-names:doc", "missing").await.unwrap();
    }

    #[tokio::test]
    async fn pattern_subscription_receives_matching_channels_only() {
        let store = MemoryStore::new();
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        store
            .subscribe_pattern(
                "events:document.*",
                Arc::new(move |_channel, _payload| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        store.publish("events:document.uploaded", "{}").await.unwrap();
        store.publish("events:auth.user.login", "{}").await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.publish("events:x", "{}").await,
            Err(StoreError::Unavailable)
        ));
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable)));
        assert!(matches!(
            store.set_add("s", "m").await,
            Err(StoreError::Unavailable)
        ));

        store.set_unavailable(false);
        assert!(store.publish("events:x", "{}").await.is_ok());
    }
}
