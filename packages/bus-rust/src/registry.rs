//! Lease-based service registry.
//!
//! Instances register their definition and health under TTL-bounded keys in
//! the shared store and join a per-service-name membership set. Discovery
//! resolves the membership set against the live keys: a lapsed lease simply
//! makes an instance invisible (silently absent, never an error), and the
//! lease is authoritative for visibility regardless of what the instance
//! believes about itself.
//!
//! Every operation is best-effort towards the store: an unreachable store
//! degrades to a logged no-op or an empty result, never an error or a
//! block. Lifecycle changes are announced through the event bus; the bus
//! has no dependency back on the registry.

use std::sync::Arc;

use lattice_core::{
    topics, Envelope, HealthCheck, HealthStatus, ServiceDefinition, ServiceHealth,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::config::RegistryConfig;
use crate::error::BusError;
use crate::store::{CoordinationStore, StoreHandle};

/// Event source id stamped on lifecycle envelopes.
const REGISTRY_SOURCE: &str = "service-registry";

/// TTL-leased registration, discovery, and health bookkeeping.
pub struct ServiceRegistry {
    store: Option<StoreHandle>,
    bus: Arc<EventBus>,
    config: RegistryConfig,
}

impl ServiceRegistry {
    /// Creates a registry. Without a store every operation becomes a logged
    /// no-op / empty result, keeping single-process deployments working.
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn CoordinationStore>>,
        bus: Arc<EventBus>,
        config: RegistryConfig,
    ) -> Self {
        let store = store.map(|s| StoreHandle::new(s, config.store_timeout));
        if store.is_none() {
            info!("no coordination store configured, service registry is a no-op");
        }
        Self { store, bus, config }
    }

    fn service_key(&self, id: &str) -> String {
        format!("{}{id}", self.config.service_prefix)
    }

    fn health_key(&self, id: &str) -> String {
        format!("{}{id}", self.config.health_prefix)
    }

    fn names_key(&self, name: &str) -> String {
        format!("{}{name}", self.config.names_prefix)
    }

    fn lifecycle_event(topic: &str, metadata: Vec<(&str, Value)>) -> Envelope {
        let mut event = Envelope::new(topic, Value::Null).with_source(REGISTRY_SOURCE);
        for (key, value) in metadata {
            event = event.with_metadata(key, value);
        }
        event
    }

    /// Registers a service instance: definition and health written under the
    /// same TTL (they expire together), instance id added to the membership
    /// set, `system.service.started` published.
    ///
    /// # Errors
    ///
    /// Only a middleware configuration error from the lifecycle publish is
    /// returned; store outages degrade to a logged no-op.
    pub async fn register(&self, definition: &ServiceDefinition) -> Result<(), BusError> {
        let Some(store) = &self.store else {
            warn!(service_id = %definition.id, "store not configured, skipping registration");
            return Ok(());
        };

        let def_json = match serde_json::to_string(definition) {
            Ok(json) => json,
            Err(err) => {
                warn!(service_id = %definition.id, error = %err, "definition not serializable");
                return Ok(());
            }
        };
        let health_json = match serde_json::to_string(&definition.health) {
            Ok(json) => json,
            Err(err) => {
                warn!(service_id = %definition.id, error = %err, "health not serializable");
                return Ok(());
            }
        };

        let writes = [
            store
                .set_with_ttl(&self.service_key(&definition.id), &def_json, self.config.ttl)
                .await,
            store
                .set_with_ttl(&self.health_key(&definition.id), &health_json, self.config.ttl)
                .await,
            store
                .set_add(&self.names_key(&definition.name), &definition.id)
                .await,
        ];
        if let Some(err) = writes.iter().find_map(|w| w.as_ref().err()) {
            warn!(
                service_id = %definition.id,
                service_name = %definition.name,
                error = %err,
                "registration skipped, store unreachable"
            );
            return Ok(());
        }

        info!(
            service_id = %definition.id,
            service_name = %definition.name,
            endpoint = %definition.endpoint,
            "service registered"
        );
        self.bus
            .publish(Self::lifecycle_event(
                topics::SERVICE_STARTED,
                vec![
                    ("serviceName", json!(definition.name)),
                    ("serviceId", json!(definition.id)),
                    ("endpoint", json!(definition.endpoint)),
                ],
            ))
            .await
    }

    /// Resolves the current non-expired, non-unhealthy instances of a
    /// logical service. A point-in-time snapshot, not a live subscription.
    pub async fn discover(&self, name: &str) -> Vec<ServiceDefinition> {
        let Some(store) = &self.store else {
            warn!(service_name = name, "store not configured, discovery returns empty");
            return Vec::new();
        };

        let ids = match store.set_members(&self.names_key(name)).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(service_name = name, error = %err, "discovery failed, store unreachable");
                return Vec::new();
            }
        };

        let mut services = Vec::new();
        for id in ids {
            // Lease expiry makes the definition key vanish; the member is
            // then silently absent from discovery.
            let def_json = match store.get(&self.service_key(&id)).await {
                Ok(Some(json)) => json,
                Ok(None) => continue,
                Err(err) => {
                    warn!(service_id = %id, error = %err, "skipping member, store unreachable");
                    continue;
                }
            };
            let mut definition: ServiceDefinition = match serde_json::from_str(&def_json) {
                Ok(def) => def,
                Err(err) => {
                    warn!(service_id = %id, error = %err, "skipping member, bad definition record");
                    continue;
                }
            };

            // Stale health reads as absent: without a live health lease the
            // member is excluded entirely.
            let health: ServiceHealth = match store.get(&self.health_key(&id)).await {
                Ok(Some(json)) => match serde_json::from_str(&json) {
                    Ok(health) => health,
                    Err(err) => {
                        warn!(service_id = %id, error = %err, "skipping member, bad health record");
                        continue;
                    }
                },
                _ => continue,
            };
            definition.health = health;

            if definition.health.status != HealthStatus::Unhealthy {
                services.push(definition);
            }
        }
        services
    }

    /// `discover` narrowed to instances currently reporting `healthy`.
    pub async fn healthy_services(&self, name: &str) -> Vec<ServiceDefinition> {
        self.discover(name)
            .await
            .into_iter()
            .filter(|def| def.health.status == HealthStatus::Healthy)
            .collect()
    }

    /// Stores a fresh health snapshot under the TTL key, renewing the lease
    /// on both the health and definition records, and publishes
    /// `system.service.health_changed` with previous and new status.
    ///
    /// # Errors
    ///
    /// Only a middleware configuration error from the lifecycle publish is
    /// returned; store outages degrade to a logged no-op.
    pub async fn update_health(
        &self,
        service_id: &str,
        status: HealthStatus,
        checks: Vec<HealthCheck>,
    ) -> Result<(), BusError> {
        let Some(store) = &self.store else {
            warn!(service_id, "store not configured, skipping health update");
            return Ok(());
        };

        let previous = match store.get(&self.health_key(service_id)).await {
            Ok(Some(json)) => serde_json::from_str::<ServiceHealth>(&json)
                .map_or_else(|_| "unknown".to_string(), |h| h.status.as_str().to_string()),
            _ => "unknown".to_string(),
        };

        let health = ServiceHealth::from_checks(status, checks);
        let health_json = match serde_json::to_string(&health) {
            Ok(json) => json,
            Err(err) => {
                warn!(service_id, error = %err, "health not serializable");
                return Ok(());
            }
        };
        if let Err(err) = store
            .set_with_ttl(&self.health_key(service_id), &health_json, self.config.ttl)
            .await
        {
            warn!(service_id, error = %err, "health update skipped, store unreachable");
            return Ok(());
        }

        // Renew the definition lease alongside so both records keep expiring
        // together; a missing definition (expired or never registered) is
        // left absent for discovery to handle.
        if let Ok(Some(def_json)) = store.get(&self.service_key(service_id)).await {
            if let Err(err) = store
                .set_with_ttl(&self.service_key(service_id), &def_json, self.config.ttl)
                .await
            {
                warn!(service_id, error = %err, "definition lease renewal failed");
            }
        }

        debug!(service_id, previous = %previous, new = status.as_str(), "health updated");
        self.bus
            .publish(Self::lifecycle_event(
                topics::SERVICE_HEALTH_CHANGED,
                vec![
                    ("serviceId", json!(service_id)),
                    ("previousHealth", json!(previous)),
                    ("newHealth", json!(status.as_str())),
                ],
            ))
            .await
    }

    /// Removes a service instance: definition and health keys deleted,
    /// membership entry removed, `system.service.stopped` published.
    /// Deregistering an unknown id is a no-op success.
    ///
    /// # Errors
    ///
    /// Only a middleware configuration error from the lifecycle publish is
    /// returned; store outages degrade to a logged no-op.
    pub async fn deregister(&self, service_id: &str) -> Result<(), BusError> {
        let Some(store) = &self.store else {
            warn!(service_id, "store not configured, skipping deregistration");
            return Ok(());
        };

        let definition: ServiceDefinition = match store.get(&self.service_key(service_id)).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(def) => def,
                Err(err) => {
                    // Unparseable record: clear the keys, membership can't be
                    // fixed without the name, lease expiry will reap it.
                    warn!(service_id, error = %err, "bad definition record, clearing keys");
                    let _ = store.delete(&self.service_key(service_id)).await;
                    let _ = store.delete(&self.health_key(service_id)).await;
                    return Ok(());
                }
            },
            Ok(None) => {
                debug!(service_id, "deregister of unknown id is a no-op");
                return Ok(());
            }
            Err(err) => {
                warn!(service_id, error = %err, "deregistration skipped, store unreachable");
                return Ok(());
            }
        };

        let removals = [
            store.delete(&self.service_key(service_id)).await,
            store.delete(&self.health_key(service_id)).await,
            store
                .set_remove(&self.names_key(&definition.name), service_id)
                .await,
        ];
        for err in removals.iter().filter_map(|r| r.as_ref().err()) {
            warn!(service_id, error = %err, "partial deregistration, store unreachable");
        }

        info!(service_id, service_name = %definition.name, "service deregistered");
        self.bus
            .publish(Self::lifecycle_event(
                topics::SERVICE_STOPPED,
                vec![
                    ("serviceName", json!(definition.name)),
                    ("serviceId", json!(service_id)),
                ],
            ))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
