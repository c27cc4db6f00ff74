//! Service registration and health data model.
//!
//! A `ServiceDefinition` describes one running instance of a logical service
//! (many instances may share a `name`). Health is stored and refreshed
//! separately by the instance's health monitor; once its lease lapses the
//! instance silently disappears from discovery.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Aggregate health status of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Derives the aggregate status from individual checks: any failing
    /// check makes the instance unhealthy, any warning degrades it.
    #[must_use]
    pub fn from_checks(checks: &[HealthCheck]) -> Self {
        if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            Self::Unhealthy
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Lowercase wire name, e.g. for event metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Outcome of a single named health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

/// One named probe result (e.g. "database": pass in 3ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: CheckStatus,
    /// Human-readable detail about the outcome.
    #[serde(default)]
    pub output: String,
    /// Time the check took, in milliseconds.
    #[serde(rename = "responseTime")]
    pub response_time: f64,
}

impl HealthCheck {
    /// Creates a passing check.
    #[must_use]
    pub fn pass(name: impl Into<String>, output: impl Into<String>, response_time: f64) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            output: output.into(),
            response_time,
        }
    }

    /// Creates a failing check.
    #[must_use]
    pub fn fail(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            output: output.into(),
            response_time: 0.0,
        }
    }
}

/// Stored health snapshot for a service instance.
///
/// Becomes stale once its lease lapses without renewal; stale health reads
/// as absent, not as any particular status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    /// Ordered check outcomes from the most recent probe.
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    /// RFC 3339 timestamp of the most recent probe.
    #[serde(rename = "lastChecked")]
    pub last_checked: String,
    /// Mean response time across checks, in milliseconds (0 when no checks).
    #[serde(rename = "responseTime")]
    pub response_time: f64,
}

impl ServiceHealth {
    /// Builds a snapshot from probe results, computing the mean response
    /// time and stamping the current time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_checks(status: HealthStatus, checks: Vec<HealthCheck>) -> Self {
        let response_time = if checks.is_empty() {
            0.0
        } else {
            checks.iter().map(|c| c.response_time).sum::<f64>() / checks.len() as f64
        };
        Self {
            status,
            checks,
            last_checked: Utc::now().to_rfc3339(),
            response_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A named operation a service instance can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCapability {
    /// Dot-namespaced operation name, e.g. `document.upload`.
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Named dependencies the operation relies on, e.g. `database`.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// One registered instance of a logical service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique per-instance id, generated at startup.
    pub id: String,
    /// Logical service name shared by all instances, e.g. `document-service`.
    pub name: String,
    pub version: String,
    /// Base URL where the instance can be reached.
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<ServiceCapability>,
    pub health: ServiceHealth,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// RFC 3339 registration timestamp.
    #[serde(rename = "registeredAt")]
    pub registered_at: String,
}

impl ServiceDefinition {
    /// Creates a definition for a fresh instance with a generated id and a
    /// healthy initial snapshot.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        endpoint: impl Into<String>,
        capabilities: Vec<ServiceCapability>,
    ) -> Self {
        let name = name.into();
        Self {
            id: crate::envelope::generate_id(&name),
            name,
            version: version.into(),
            endpoint: endpoint.into(),
            capabilities,
            health: ServiceHealth::from_checks(HealthStatus::Healthy, Vec::new()),
            metadata: serde_json::Map::new(),
            registered_at: Utc::now().to_rfc3339(),
        }
    }

    /// Returns `true` if the instance advertises the named capability.
    #[must_use]
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn checks(statuses: &[CheckStatus]) -> Vec<HealthCheck> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, &status)| HealthCheck {
                name: format!("check-{i}"),
                status,
                output: String::new(),
                response_time: 10.0,
            })
            .collect()
    }

    #[test]
    fn status_from_checks_prefers_worst_outcome() {
        use CheckStatus::{Fail, Pass, Warn};

        assert_eq!(HealthStatus::from_checks(&checks(&[Pass, Pass])), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_checks(&checks(&[Pass, Warn])), HealthStatus::Degraded);
        assert_eq!(
            HealthStatus::from_checks(&checks(&[Pass, Warn, Fail])),
            HealthStatus::Unhealthy
        );
        // No checks at all reads as healthy.
        assert_eq!(HealthStatus::from_checks(&[]), HealthStatus::Healthy);
    }

    #[test]
    fn health_response_time_is_mean_of_checks() {
        let health = ServiceHealth::from_checks(
            HealthStatus::Healthy,
            vec![
                HealthCheck::pass("database", "ok", 10.0),
                HealthCheck::pass("cache", "ok", 30.0),
            ],
        );
        assert!((health.response_time - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn health_response_time_zero_without_checks() {
        let health = ServiceHealth::from_checks(HealthStatus::Degraded, Vec::new());
        assert_eq!(health.response_time, 0.0);
        assert!(chrono::DateTime::parse_from_rfc3339(&health.last_checked).is_ok());
    }

    #[test]
    fn definition_generates_unique_instance_ids() {
        let a = ServiceDefinition::new("document-service", "2.0.0", "http://localhost:3000", vec![]);
        let b = ServiceDefinition::new("document-service", "2.0.0", "http://localhost:3000", vec![]);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("document-service_"));
    }

    #[test]
    fn has_capability_matches_by_name() {
        let def = ServiceDefinition::new(
            "document-service",
            "2.0.0",
            "http://localhost:3000",
            vec![ServiceCapability {
                name: "document.upload".to_string(),
                version: "1.0.0".to_string(),
                description: "Upload a document".to_string(),
                dependencies: vec!["database".to_string()],
            }],
        );
        assert!(def.has_capability("document.upload"));
        assert!(!def.has_capability("document.delete"));
    }

    #[test]
    fn health_serializes_with_wire_field_names() {
        let health = ServiceHealth::from_checks(
            HealthStatus::Unhealthy,
            vec![HealthCheck::fail("database", "connection refused")],
        );
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "unhealthy");
        assert_eq!(value["checks"][0]["status"], "fail");
        assert!(value["lastChecked"].is_string());
        assert!(value["responseTime"].is_number());
    }
}
