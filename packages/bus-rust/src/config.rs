//! Configuration for the bus, registry, and health monitor.

use std::time::Duration;

use lattice_core::generate_id;

/// Event bus configuration.
///
/// Controls replay history, broker channel naming, and the timeout applied
/// to every external-store call.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Unique id of this bus instance; used by the broker bridge to drop
    /// its own echoed messages.
    pub instance_id: String,
    /// Maximum number of published envelopes retained for replay.
    pub replay_capacity: usize,
    /// Prefix for broker channels; the topic is appended, e.g. `events:document.uploaded`.
    pub channel_prefix: String,
    /// Upper bound on any single external-store call. A hang is treated as
    /// failure, never as an indefinite block.
    pub store_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            instance_id: generate_id("bus"),
            replay_capacity: 1000,
            channel_prefix: "events:".to_string(),
            store_timeout: Duration::from_secs(2),
        }
    }
}

/// Service registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Lease duration for definition and health keys; both expire together.
    pub ttl: Duration,
    /// Key prefix for service definitions (`services:{id}`).
    pub service_prefix: String,
    /// Key prefix for health snapshots (`health:{id}`).
    pub health_prefix: String,
    /// Key prefix for per-service-name membership sets (`service-names:{name}`).
    pub names_prefix: String,
    /// Timeout applied to every registry store call.
    pub store_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            service_prefix: "services:".to_string(),
            health_prefix: "health:".to_string(),
            names_prefix: "service-names:".to_string(),
            store_timeout: Duration::from_secs(2),
        }
    }
}

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between periodic self-probes. Each probe also renews the
    /// registration lease, so this must stay well below `RegistryConfig::ttl`.
    pub probe_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_platform_conventions() {
        let bus = BusConfig::default();
        assert_eq!(bus.replay_capacity, 1000);
        assert_eq!(bus.channel_prefix, "events:");
        assert!(bus.instance_id.starts_with("bus_"));

        let registry = RegistryConfig::default();
        assert_eq!(registry.ttl, Duration::from_secs(60));

        let monitor = MonitorConfig::default();
        assert!(monitor.probe_interval < registry.ttl);
    }
}
