//! Call correlation and deduplication.
//!
//! The [`CorrelationEngine`] consumes classified AMI events one at a time
//! and decides, for each call answered on the watched extension, whether a
//! screen-pop should be dispatched. It owns all mutable state involved:
//!
//! - a [`CallTracker`] bridging `DialBegin` and `DialEnd` of one call,
//! - three independent [`DedupGate`]s (ring logging, answer processing,
//!   dispatch), so a retransmitted or replayed event can never trigger a
//!   second pop within its window,
//! - a rate-limited eviction sweep bounding the size of all caches.
//!
//! Events are handled through `&mut self`, so the single-consumer delivery
//! order of the AMI reader serializes every state mutation without locks.

pub mod dedup;
pub mod ids;
pub mod matcher;
pub mod tracker;

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::dispatch::DispatchRequest;
use crate::event::{AmiEvent, EventKind};

use dedup::DedupGate;
use ids::IdSource;
use tracker::CallTracker;

/// Throttle for duplicate "ring" log records on one call.
const RING_LOG_TTL: Duration = Duration::from_secs(15);

/// Window within which one answered call is processed at most once.
const ANSWER_TTL: Duration = Duration::from_secs(180);

/// Window within which one call id is dispatched at most once.
const DISPATCH_TTL: Duration = Duration::from_secs(180);

/// How long an unresolved ringing call is remembered. Longer than the
/// answer window so a slow answer never races the eviction sweep.
const PENDING_TTL: Duration = Duration::from_secs(240);

/// Minimum interval between eviction sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Coarse eviction horizons per gate, as multiples of each gate's TTL.
const RING_EVICT_MULTIPLE: u32 = 4;
const ANSWER_EVICT_MULTIPLE: u32 = 2;
const DISPATCH_EVICT_MULTIPLE: u32 = 2;

/// Numbers this short are internal extensions, not external callers.
const INTERNAL_NUMBER_MAX_LEN: usize = 3;

/// Cache sizes, exposed for tests and debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Entries in the ring-log gate.
    pub ring_entries: usize,
    /// Entries in the answer gate.
    pub answer_entries: usize,
    /// Entries in the dispatch gate.
    pub dispatch_entries: usize,
    /// Calls currently pending resolution.
    pub pending_calls: usize,
}

/// The call-correlation engine for one watched extension.
#[derive(Debug)]
pub struct CorrelationEngine {
    extension: String,
    id_source: IdSource,
    include_internal_calls: bool,
    ring_gate: DedupGate<(String, String)>,
    answer_gate: DedupGate<u64>,
    dispatch_gate: DedupGate<u64>,
    tracker: CallTracker,
    last_sweep: Option<Instant>,
}

impl CorrelationEngine {
    /// Creates an engine watching `extension`.
    #[must_use]
    pub fn new(extension: String, id_source: IdSource, include_internal_calls: bool) -> Self {
        Self {
            extension,
            id_source,
            include_internal_calls,
            ring_gate: DedupGate::new(RING_LOG_TTL),
            answer_gate: DedupGate::new(ANSWER_TTL),
            dispatch_gate: DedupGate::new(DISPATCH_TTL),
            tracker: CallTracker::new(PENDING_TTL),
            last_sweep: None,
        }
    }

    /// Processes one event.
    ///
    /// Returns a [`DispatchRequest`] when the event resolves a call on the
    /// watched extension that passed every dedup gate; the caller hands it
    /// to the action sink. All other events return `None`.
    pub fn handle(&mut self, event: &AmiEvent) -> Option<DispatchRequest> {
        self.maybe_sweep();

        match event.kind {
            EventKind::DialBegin => {
                self.on_dial_begin(event);
                None
            }
            EventKind::DialEnd => self.on_dial_end(event),
            EventKind::Other => None,
        }
    }

    /// Ring phase: remember who is calling, log the ring once.
    ///
    /// Purely observational with respect to dispatching; the answer path
    /// never depends on the ring-log gate.
    fn on_dial_begin(&mut self, event: &AmiEvent) {
        if !matcher::concerns_extension(event, &self.extension) {
            return;
        }

        let call_group_id = event.call_group_id();
        if call_group_id.is_empty() {
            debug!(kind = ?event.kind, "Event without call-group id ignored");
            return;
        }

        let caller = event.caller_id_num.trim();
        if caller.is_empty()
            || caller == self.extension
            || caller.len() <= INTERNAL_NUMBER_MAX_LEN
        {
            return;
        }

        self.tracker.note_ring(call_group_id, caller);

        let ring_key = (call_group_id.to_string(), self.extension.clone());
        if self.ring_gate.admit(ring_key) {
            info!(
                extension = %self.extension,
                caller = %caller,
                call_group_id = %call_group_id,
                "Ring detected, waiting for answer"
            );
        }
    }

    /// Resolve phase: an answered dial on the watched extension produces at
    /// most one dispatch request.
    fn on_dial_end(&mut self, event: &AmiEvent) -> Option<DispatchRequest> {
        if !event.is_answered() {
            return None;
        }
        if !matcher::concerns_extension(event, &self.extension) {
            return None;
        }

        let call_group_id = event.call_group_id();
        if call_group_id.is_empty() {
            debug!("Answered DialEnd without call-group id ignored");
            return None;
        }

        let Some(call_id) = ids::canonical_call_id(event, self.id_source) else {
            debug!(call_group_id = %call_group_id, "Call id did not normalize");
            return None;
        };

        if !self.answer_gate.admit(call_id) {
            debug!(call_id, "Duplicate answer suppressed");
            return None;
        }

        // Prefer the caller remembered at ring time; fall back to the
        // DialEnd's own caller field when the ring was never seen.
        let caller = self
            .tracker
            .resolve(call_group_id)
            .unwrap_or_else(|| event.caller_id_num.trim().to_string());

        if caller.is_empty() || caller == self.extension {
            return None;
        }
        if !self.include_internal_calls && caller.len() <= INTERNAL_NUMBER_MAX_LEN {
            debug!(caller = %caller, "Internal call, dispatch disabled");
            return None;
        }

        // Final guard directly in front of the action sink, independent of
        // the answer gate.
        if !self.dispatch_gate.admit(call_id) {
            return None;
        }

        info!(
            caller = %caller,
            extension = %self.extension,
            call_id,
            "Call answered, dispatching"
        );

        Some(DispatchRequest {
            caller,
            extension: self.extension.clone(),
            call_id,
        })
    }

    /// Evicts stale state from all caches, at most once per sweep interval.
    fn maybe_sweep(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_sweep {
            if now.duration_since(last) < SWEEP_INTERVAL {
                return;
            }
        }
        self.last_sweep = Some(now);

        self.ring_gate.evict(RING_EVICT_MULTIPLE);
        self.answer_gate.evict(ANSWER_EVICT_MULTIPLE);
        self.dispatch_gate.evict(DISPATCH_EVICT_MULTIPLE);
        self.tracker.evict();
    }

    /// Current cache sizes.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ring_entries: self.ring_gate.len(),
            answer_entries: self.answer_gate.len(),
            dispatch_entries: self.dispatch_gate.len(),
            pending_calls: self.tracker.len(),
        }
    }
}
