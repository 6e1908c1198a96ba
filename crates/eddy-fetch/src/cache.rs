//! Single-slot response cache with a freshness window.
//!
//! A fresh entry lets the caller skip the network entirely. An expired entry
//! is kept as a stale fallback for when the refetch fails.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    ttl: Duration,
    entry: Option<(V, Instant)>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace the cached value, stamped now.
    pub fn store(&mut self, value: V) {
        self.store_at(value, Instant::now());
    }

    /// Replace the cached value with an explicit timestamp.
    pub fn store_at(&mut self, value: V, at: Instant) {
        self.entry = Some((value, at));
    }

    /// The value if it is younger than the TTL.
    pub fn fresh(&self) -> Option<&V> {
        self.entry
            .as_ref()
            .filter(|(_, at)| at.elapsed() < self.ttl)
            .map(|(v, _)| v)
    }

    /// The value regardless of age.
    pub fn stale(&self) -> Option<&V> {
        self.entry.as_ref().map(|(v, _)| v)
    }

    /// Age of the cached value.
    pub fn age(&self) -> Option<Duration> {
        self.entry.as_ref().map(|(_, at)| at.elapsed())
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}
