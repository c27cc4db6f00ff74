//! Bus error types.
//!
//! Only configuration errors surface to callers: a misbehaving middleware is
//! fatal and propagates from `publish`. Transient store failures are logged
//! and absorbed (best-effort semantics), handler failures are isolated per
//! handler, and operations on unknown service ids are idempotent no-ops.

use thiserror::Error;

/// Errors returned by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A middleware failed or violated the envelope identity invariant.
    /// This is a configuration error: fatal, never retried per-event.
    #[error("middleware '{name}' failed: {source}")]
    Middleware {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl BusError {
    /// Wraps a middleware failure.
    #[must_use]
    pub fn middleware(name: &'static str, source: anyhow::Error) -> Self {
        Self::Middleware { name, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middleware_error_names_the_offender() {
        let err = BusError::middleware("enrich", anyhow::anyhow!("boom"));
        let text = err.to_string();
        assert!(text.contains("enrich"));
        assert!(text.contains("boom"));
    }
}
