//! Event envelope: the structured unit flowing through the bus.
//!
//! An envelope carries a hierarchical dot-namespaced topic (`type` on the
//! wire), identity and correlation ids, an open metadata map, and a
//! type-specific JSON payload. Identity fields (`id`, `timestamp`,
//! `correlation_id`) start empty and are filled by [`Envelope::seal`] at
//! publish time; once sealed they are immutable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Topic namespace
// ---------------------------------------------------------------------------

/// Canonical topic names used across the platform.
///
/// Collaborators publishing their own events must reuse or consistently
/// extend this dot-separated namespace.
pub mod topics {
    // Document events
    pub const DOCUMENT_UPLOADED: &str = "document.uploaded";
    pub const DOCUMENT_DOWNLOADED: &str = "document.downloaded";
    pub const DOCUMENT_DELETED: &str = "document.deleted";
    pub const DOCUMENT_PROCESSED: &str = "document.processed";
    pub const DOCUMENT_SHARED: &str = "document.shared";

    // Auth events
    pub const USER_REGISTERED: &str = "auth.user.registered";
    pub const USER_LOGIN: &str = "auth.user.login";
    pub const USER_LOGOUT: &str = "auth.user.logout";
    pub const TOKEN_REFRESHED: &str = "auth.token.refreshed";
    pub const TOKEN_REVOKED: &str = "auth.token.revoked";

    // System lifecycle events
    pub const SERVICE_STARTED: &str = "system.service.started";
    pub const SERVICE_STOPPED: &str = "system.service.stopped";
    pub const SERVICE_HEALTH_CHANGED: &str = "system.service.health_changed";
    pub const RATE_LIMIT_EXCEEDED: &str = "system.rate_limit.exceeded";

    // Notification events
    pub const EMAIL_SENT: &str = "notification.email.sent";
    pub const SMS_SENT: &str = "notification.sms.sent";
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single event on the bus.
///
/// Serializes to the platform's JSON wire shape (camelCase identity fields).
/// `id`, `timestamp`, and `correlation_id` use the empty string as "unset";
/// the bus seals them before anything else sees the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique event id (`evt_` + uuid), generated at publish if absent.
    #[serde(default)]
    pub id: String,
    /// Hierarchical dot-namespaced topic, e.g. `document.uploaded`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// RFC 3339 timestamp, generated at publish if absent.
    #[serde(default)]
    pub timestamp: String,
    /// Schema version of the payload.
    #[serde(default = "default_version")]
    pub version: String,
    /// Producer identifier (logical service name or instance id).
    #[serde(default)]
    pub source: String,
    /// Correlation id (`corr_` + uuid) propagated across causally related
    /// events; generated at publish if absent.
    #[serde(rename = "correlationId", default)]
    pub correlation_id: String,
    /// Acting user, when the event is attributable to one.
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<i64>,
    /// Open string-keyed map for enrichment (middleware may add entries).
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Envelope {
    /// Creates an unsealed envelope for the given topic and payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: String::new(),
            event_type: event_type.into(),
            timestamp: String::new(),
            version: default_version(),
            source: String::new(),
            correlation_id: String::new(),
            user_id: None,
            metadata: serde_json::Map::new(),
            payload,
        }
    }

    /// Sets the producer id.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sets an explicit correlation id (suppresses generation at seal time).
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Attributes the event to a user.
    #[must_use]
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Fills any unset identity field (`id`, `timestamp`, `correlation_id`).
    ///
    /// Idempotent: fields that are already non-empty are never touched.
    pub fn seal(&mut self) {
        if self.id.is_empty() {
            self.id = generate_id("evt");
        }
        if self.timestamp.is_empty() {
            self.timestamp = Utc::now().to_rfc3339();
        }
        if self.correlation_id.is_empty() {
            self.correlation_id = generate_id("corr");
        }
    }

    /// Returns `true` once all three identity fields are non-empty.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        !self.id.is_empty() && !self.timestamp.is_empty() && !self.correlation_id.is_empty()
    }
}

/// Generates a prefixed unique id, e.g. `evt_5b3f…`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
