//! Time-windowed "allow once" deduplication.
//!
//! A [`DedupGate`] admits a key at most once per TTL window. Rejections do
//! not refresh the window: a burst of duplicates is suppressed for exactly
//! `ttl` measured from the last *admitted* occurrence, after which the next
//! occurrence is admitted again.
//!
//! Uses [`tokio::time::Instant`] so tests can pause and advance the clock.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

/// A keyed allow-once gate with a fixed TTL.
#[derive(Debug)]
pub struct DedupGate<K> {
    ttl: Duration,
    last_admitted: HashMap<K, Instant>,
}

impl<K: Eq + Hash> DedupGate<K> {
    /// Creates a gate that admits each key at most once per `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_admitted: HashMap::new(),
        }
    }

    /// Admits `key` if its TTL window has fully elapsed.
    ///
    /// Returns true and records the admission time when the key is unknown
    /// or was last admitted at least `ttl` ago. Returns false otherwise,
    /// leaving the recorded admission time untouched.
    pub fn admit(&mut self, key: K) -> bool {
        let now = Instant::now();
        if let Some(&stamp) = self.last_admitted.get(&key) {
            if now.duration_since(stamp) < self.ttl {
                return false;
            }
        }
        self.last_admitted.insert(key, now);
        true
    }

    /// Drops entries whose last admission is older than `ttl * multiple`.
    ///
    /// Memory bounding only: the horizon is coarser than the admission TTL,
    /// so eviction never changes the outcome of [`admit`](Self::admit).
    pub fn evict(&mut self, multiple: u32) {
        let horizon = self.ttl * multiple;
        let now = Instant::now();
        self.last_admitted
            .retain(|_, stamp| now.duration_since(*stamp) <= horizon);
    }

    /// Number of keys currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_admitted.len()
    }

    /// Returns true when no keys are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_admitted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn first_admission_succeeds() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("a"));
        assert_eq!(gate.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_within_ttl_rejected() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("a"));
        advance(Duration::from_secs(14)).await;
        assert!(!gate.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn readmitted_after_ttl() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("a"));
        advance(TTL).await;
        assert!(gate.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_do_not_extend_the_window() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("a"));

        // Hammer the gate right before expiry; the window must still be
        // measured from the admission, not from the last rejection.
        advance(Duration::from_secs(14)).await;
        assert!(!gate.admit("a"));
        advance(Duration::from_secs(1)).await;
        assert!(gate.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn independent_keys() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("a"));
        assert!(gate.admit("b"));
        assert!(!gate.admit("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn evict_drops_only_stale_entries() {
        let mut gate = DedupGate::new(TTL);
        assert!(gate.admit("old"));
        advance(TTL * 4 + Duration::from_secs(1)).await;
        assert!(gate.admit("fresh"));

        gate.evict(4);
        assert_eq!(gate.len(), 1);

        // The evicted key is admissible again, as it would have been anyway.
        assert!(gate.admit("old"));
    }
}
