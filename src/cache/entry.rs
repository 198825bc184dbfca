//! A single cached value and its freshness bookkeeping.

use std::time::Duration;
use tokio::time::Instant;

/// A cached value stamped with its write time and TTL.
///
/// The timestamp is fixed at construction. Overwriting a key replaces the
/// whole entry rather than touching the old one.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Create an entry written now.
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
            ttl,
        }
    }

    /// Time elapsed since the entry was written.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.timestamp)
    }

    /// Fresh iff `age <= ttl`.
    pub fn is_fresh(&self) -> bool {
        self.age() <= self.ttl
    }

    /// Eligible for pruning once older than twice its TTL.
    pub fn is_prunable(&self) -> bool {
        self.age() > self.ttl.saturating_mul(2)
    }
}
