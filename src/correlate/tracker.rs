//! Pending-call tracking between ring and answer.
//!
//! `DialBegin` carries the external caller number but no answer outcome;
//! `DialEnd` carries the outcome but often only the far leg's caller id.
//! The tracker bridges the two: it remembers the caller number per raw
//! call-group identifier while the call rings, hands it out exactly once
//! when the call resolves, and forgets entries that never resolve.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// A call that has started ringing and not yet resolved.
#[derive(Debug)]
struct PendingCall {
    caller: String,
    created_at: Instant,
}

/// Map of raw call-group identifier to the caller ringing it.
#[derive(Debug)]
pub struct CallTracker {
    ttl: Duration,
    pending: HashMap<String, PendingCall>,
}

impl CallTracker {
    /// Creates a tracker that forgets unresolved calls after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Records the caller for a ringing call.
    ///
    /// Creates the entry if absent. An existing entry is only updated when
    /// its caller slot is empty; a non-empty caller is never overwritten,
    /// so retransmitted ring events cannot change the association.
    pub fn note_ring(&mut self, call_group_id: &str, caller: &str) {
        let entry = self
            .pending
            .entry(call_group_id.to_string())
            .or_insert_with(|| PendingCall {
                caller: String::new(),
                created_at: Instant::now(),
            });
        if entry.caller.is_empty() {
            entry.caller = caller.to_string();
        }
    }

    /// Removes and returns the caller for a resolved call.
    ///
    /// Returns `None` when no ring was seen for this identifier (late or
    /// dropped `DialBegin`); the caller must then come from the resolve
    /// event itself.
    pub fn resolve(&mut self, call_group_id: &str) -> Option<String> {
        self.pending.remove(call_group_id).map(|call| call.caller)
    }

    /// Drops entries that have been pending longer than the TTL.
    pub fn evict(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.pending
            .retain(|_, call| now.duration_since(call.created_at) <= ttl);
    }

    /// Number of calls currently pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true when no calls are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(240);

    #[tokio::test(start_paused = true)]
    async fn resolve_returns_noted_caller() {
        let mut tracker = CallTracker::new(TTL);
        tracker.note_ring("1706871234.10", "02144445555");
        assert_eq!(
            tracker.resolve("1706871234.10"),
            Some("02144445555".to_string())
        );
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_is_consuming() {
        let mut tracker = CallTracker::new(TTL);
        tracker.note_ring("1706871234.10", "02144445555");
        assert!(tracker.resolve("1706871234.10").is_some());
        assert_eq!(tracker.resolve("1706871234.10"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_is_set_once() {
        let mut tracker = CallTracker::new(TTL);
        tracker.note_ring("1706871234.10", "02144445555");
        tracker.note_ring("1706871234.10", "09121112222");
        assert_eq!(
            tracker.resolve("1706871234.10"),
            Some("02144445555".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_caller_slot_can_be_filled_later() {
        let mut tracker = CallTracker::new(TTL);
        tracker.note_ring("1706871234.10", "");
        tracker.note_ring("1706871234.10", "02144445555");
        assert_eq!(
            tracker.resolve("1706871234.10"),
            Some("02144445555".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_call_resolves_to_none() {
        let mut tracker = CallTracker::new(TTL);
        assert_eq!(tracker.resolve("1706871234.99"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn evict_drops_expired_entries() {
        let mut tracker = CallTracker::new(TTL);
        tracker.note_ring("old", "02144445555");
        advance(TTL + Duration::from_secs(1)).await;
        tracker.note_ring("fresh", "09121112222");

        tracker.evict();
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.resolve("old"), None);
        assert!(tracker.resolve("fresh").is_some());
    }
}
