//! Bounded replay history of published envelopes.
//!
//! Fixed-capacity FIFO: once full, the oldest entry is evicted for each new
//! publish. Entries are immutable copies taken after the middleware
//! pipeline ran. This is a debugging aid, not a durable event log.

use std::collections::VecDeque;

use lattice_core::Envelope;
use parking_lot::Mutex;

/// Bounded FIFO of recently published envelopes.
pub struct ReplayBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<Envelope>>,
}

impl ReplayBuffer {
    /// Creates a buffer holding at most `capacity` envelopes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends an envelope, evicting the oldest entry when full.
    pub fn push(&self, event: Envelope) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Returns up to `limit` most-recent entries, oldest first (newest last).
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<Envelope> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Current number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(n: usize) -> Envelope {
        let mut env = Envelope::new("document.uploaded", json!({ "n": n }));
        env.seal();
        env
    }

    #[test]
    fn recent_returns_newest_last_in_publish_order() {
        let buffer = ReplayBuffer::new(10);
        for n in 0..5 {
            buffer.push(event(n));
        }

        let recent = buffer.recent(3);
        let ns: Vec<u64> = recent.iter().map(|e| e.payload["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3, 4]);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let capacity = 10;
        let buffer = ReplayBuffer::new(capacity);
        for n in 0..capacity + 5 {
            buffer.push(event(n));
        }

        assert_eq!(buffer.len(), capacity);
        let all = buffer.recent(capacity);
        let ns: Vec<u64> = all.iter().map(|e| e.payload["n"].as_u64().unwrap()).collect();
        let expected: Vec<u64> = (5..15).map(|n| n as u64).collect();
        assert_eq!(ns, expected);
    }

    #[test]
    fn recent_never_exceeds_retained_count() {
        let buffer = ReplayBuffer::new(10);
        buffer.push(event(0));
        buffer.push(event(1));

        assert_eq!(buffer.recent(100).len(), 2);
        assert_eq!(buffer.recent(0).len(), 0);
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let buffer = ReplayBuffer::new(10);
        assert!(buffer.is_empty());
        assert!(buffer.recent(5).is_empty());
    }
}
