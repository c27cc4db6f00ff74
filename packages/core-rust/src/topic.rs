//! Topic pattern parsing and matching.
//!
//! Subscriptions name one of three pattern classes: an exact topic string,
//! a prefix wildcard ending in `*` (e.g. `document.*`), or the global `*`.
//! A single publish may satisfy handlers in all three classes.

use std::fmt;

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicPattern {
    /// Matches one topic by string equality.
    Exact(String),
    /// Matches any topic starting with the stored prefix (source text ended
    /// in `*`; the star is not stored).
    Prefix(String),
    /// Matches every topic (`*`).
    Global,
}

impl TopicPattern {
    /// Parses a pattern from its source text.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Self::Global
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Self::Prefix(prefix.to_string())
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    /// Returns `true` if the given topic satisfies this pattern.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Exact(exact) => topic == exact,
            Self::Prefix(prefix) => topic.starts_with(prefix.as_str()),
            Self::Global => true,
        }
    }

    /// Returns `true` for the two wildcard classes.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Self::Exact(_))
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Global => f.write_str("*"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
