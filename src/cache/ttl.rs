//! TTL Resolver Module
//!
//! Maps cache keys to a time-to-live by ordered substring rules.

use std::time::Duration;

// == TTL Rule ==
/// A `(pattern, ttl)` pair. The pattern is a plain substring, not a regex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlRule {
    pub pattern: String,
    pub ttl: Duration,
}

impl TtlRule {
    pub fn new(pattern: impl Into<String>, ttl: Duration) -> Self {
        Self {
            pattern: pattern.into(),
            ttl,
        }
    }
}

// == TTL Resolver ==
/// Resolves the TTL for a key.
///
/// Rules are checked in configured order and the first rule whose pattern
/// occurs in the key wins. Keys that match nothing get the default.
#[derive(Debug, Clone)]
pub struct TtlResolver {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl TtlResolver {
    pub fn new(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    /// Returns the TTL that applies to `key`. Never fails.
    pub fn resolve(&self, key: &str) -> Duration {
        self.rules
            .iter()
            .find(|rule| key.contains(rule.pattern.as_str()))
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }
}
