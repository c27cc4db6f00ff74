//! Envelope middleware pipeline.
//!
//! Middlewares run in registration order on every publish, each receiving
//! the envelope and returning an (optionally enriched) envelope. A
//! middleware error is a fatal configuration error: it propagates to the
//! publisher and is never retried per-event. Middlewares may add fields but
//! must never overwrite the sealed identity fields; the bus rejects a
//! pipeline that does.

use async_trait::async_trait;
use chrono::Utc;
use lattice_core::{generate_id, Envelope};

/// A pluggable envelope enricher.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Stable name used in configuration-error reports.
    fn name(&self) -> &'static str;

    /// Transforms the envelope. Errors abort the publish.
    async fn process(&self, event: Envelope) -> anyhow::Result<Envelope>;
}

// ---------------------------------------------------------------------------
// Built-in enrichment middlewares
// ---------------------------------------------------------------------------
//
// The bus seals identity fields itself before the pipeline runs, so these
// are redundant on the default path; they exist for buses constructed with
// sealing middlewares explicitly chained (and as reference middleware
// implementations). All three fill only absent fields.

/// Fills a missing event id.
pub struct EnsureEventId;

#[async_trait]
impl Middleware for EnsureEventId {
    fn name(&self) -> &'static str {
        "ensure-event-id"
    }

    async fn process(&self, mut event: Envelope) -> anyhow::Result<Envelope> {
        if event.id.is_empty() {
            event.id = generate_id("evt");
        }
        Ok(event)
    }
}

/// Fills a missing timestamp.
pub struct EnsureTimestamp;

#[async_trait]
impl Middleware for EnsureTimestamp {
    fn name(&self) -> &'static str {
        "ensure-timestamp"
    }

    async fn process(&self, mut event: Envelope) -> anyhow::Result<Envelope> {
        if event.timestamp.is_empty() {
            event.timestamp = Utc::now().to_rfc3339();
        }
        Ok(event)
    }
}

/// Fills a missing correlation id.
pub struct EnsureCorrelation;

#[async_trait]
impl Middleware for EnsureCorrelation {
    fn name(&self) -> &'static str {
        "ensure-correlation"
    }

    async fn process(&self, mut event: Envelope) -> anyhow::Result<Envelope> {
        if event.correlation_id.is_empty() {
            event.correlation_id = generate_id("corr");
        }
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lattice_core::topics;
    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn ensure_middlewares_fill_absent_fields() {
        let event = Envelope::new(topics::DOCUMENT_UPLOADED, Value::Null);

        let event = EnsureEventId.process(event).await.unwrap();
        let event = EnsureTimestamp.process(event).await.unwrap();
        let event = EnsureCorrelation.process(event).await.unwrap();

        assert!(event.is_sealed());
    }

    #[tokio::test]
    async fn ensure_middlewares_keep_present_fields() {
        let mut event = Envelope::new(topics::DOCUMENT_UPLOADED, Value::Null);
        event.id = "evt_fixed".to_string();
        event.timestamp = "2024-01-01T00:00:00Z".to_string();
        event.correlation_id = "corr_fixed".to_string();

        let event = EnsureEventId.process(event).await.unwrap();
        let event = EnsureTimestamp.process(event).await.unwrap();
        let event = EnsureCorrelation.process(event).await.unwrap();

        assert_eq!(event.id, "evt_fixed");
        assert_eq!(event.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(event.correlation_id, "corr_fixed");
    }
}
