//! End-to-end scenarios for the correlation engine.
//!
//! Drives a [`CorrelationEngine`] with hand-built AMI events under paused
//! tokio time and checks the dispatch decisions: one screen-pop per
//! answered call, duplicate suppression within the dedup windows,
//! re-admission after they elapse, and eviction of stale state.

use std::time::Duration;

use tokio::time::advance;

use callpop::correlate::ids::IdSource;
use callpop::correlate::CorrelationEngine;
use callpop::event::{AmiEvent, EventKind};

const EXTENSION: &str = "9020";
const CALLER: &str = "02144445555";
const LINKEDID: &str = "1706871234.10";
const CANONICAL_ID: u64 = 170_687_123_410;

fn engine() -> CorrelationEngine {
    CorrelationEngine::new(EXTENSION.to_string(), IdSource::Linkedid, true)
}

fn dial_begin(caller: &str, linkedid: &str) -> AmiEvent {
    AmiEvent {
        kind: EventKind::DialBegin,
        caller_id_num: caller.to_string(),
        channel: "SIP/trunk-00000001".to_string(),
        dest_channel: format!("SIP/{EXTENSION}-00000002"),
        linkedid: linkedid.to_string(),
        uniqueid: "1706871234.11".to_string(),
        ..AmiEvent::default()
    }
}

fn dial_end(status: &str, linkedid: &str) -> AmiEvent {
    AmiEvent {
        kind: EventKind::DialEnd,
        dial_status: status.to_string(),
        dest_caller_id_num: EXTENSION.to_string(),
        dest_channel: format!("SIP/{EXTENSION}-00000002"),
        linkedid: linkedid.to_string(),
        uniqueid: "1706871234.11".to_string(),
        ..AmiEvent::default()
    }
}

#[tokio::test(start_paused = true)]
async fn answered_call_dispatches_exactly_once() {
    let mut engine = engine();

    assert!(engine.handle(&dial_begin(CALLER, LINKEDID)).is_none());
    assert_eq!(engine.stats().pending_calls, 1);

    let request = engine.handle(&dial_end("ANSWER", LINKEDID)).unwrap();
    assert_eq!(request.caller, CALLER);
    assert_eq!(request.extension, EXTENSION);
    assert_eq!(request.call_id, CANONICAL_ID);

    // The pending entry was consumed.
    assert_eq!(engine.stats().pending_calls, 0);

    // Replaying the exact answer event yields no second dispatch.
    assert!(engine.handle(&dial_end("ANSWER", LINKEDID)).is_none());
    assert!(engine.handle(&dial_end("ANSWER", LINKEDID)).is_none());
}

#[tokio::test(start_paused = true)]
async fn ring_may_arrive_long_before_the_answer() {
    let mut engine = engine();
    engine.handle(&dial_begin(CALLER, LINKEDID));

    // Within the pending TTL the association survives.
    advance(Duration::from_secs(120)).await;

    let request = engine.handle(&dial_end("ANSWER", LINKEDID)).unwrap();
    assert_eq!(request.caller, CALLER);
}

#[tokio::test(start_paused = true)]
async fn replay_after_the_answer_window_dispatches_again() {
    let mut engine = engine();

    let end = AmiEvent {
        caller_id_num: CALLER.to_string(),
        ..dial_end("ANSWER", LINKEDID)
    };
    assert!(engine.handle(&end).is_some());

    advance(Duration::from_secs(181)).await;
    let request = engine.handle(&end).unwrap();
    assert_eq!(request.call_id, CANONICAL_ID);
}

#[tokio::test(start_paused = true)]
async fn unanswered_outcome_is_inert() {
    let mut engine = engine();
    engine.handle(&dial_begin(CALLER, LINKEDID));

    for status in ["BUSY", "NOANSWER", "CANCEL", "CONGESTION", ""] {
        assert!(engine.handle(&dial_end(status, LINKEDID)).is_none());
    }

    // The tracker entry is untouched and still resolves.
    assert_eq!(engine.stats().pending_calls, 1);
    let request = engine.handle(&dial_end("ANSWER", LINKEDID)).unwrap();
    assert_eq!(request.caller, CALLER);
}

#[tokio::test(start_paused = true)]
async fn answer_without_ring_uses_the_event_caller() {
    let mut engine = engine();

    let end = AmiEvent {
        caller_id_num: "02199998888".to_string(),
        ..dial_end("ANSWER", LINKEDID)
    };

    let request = engine.handle(&end).unwrap();
    assert_eq!(request.caller, "02199998888");
    assert_eq!(request.call_id, CANONICAL_ID);
}

#[tokio::test(start_paused = true)]
async fn answer_with_no_caller_at_all_is_dropped() {
    let mut engine = engine();
    assert!(engine.handle(&dial_end("ANSWER", LINKEDID)).is_none());
}

#[tokio::test(start_paused = true)]
async fn events_for_other_extensions_are_ignored() {
    let mut engine = engine();

    // 902 and 19020 overlap 9020 numerically but must not match.
    let mut begin = dial_begin(CALLER, LINKEDID);
    begin.dest_channel = "SIP/902-00000002".to_string();
    engine.handle(&begin);
    assert_eq!(engine.stats().pending_calls, 0);

    let mut end = dial_end("ANSWER", LINKEDID);
    end.dest_caller_id_num = "902".to_string();
    end.dest_channel = "SIP/19020-00000002".to_string();
    assert!(engine.handle(&end).is_none());
}

#[tokio::test(start_paused = true)]
async fn caller_matching_the_extension_is_rejected() {
    let mut engine = engine();

    let end = AmiEvent {
        caller_id_num: EXTENSION.to_string(),
        ..dial_end("ANSWER", LINKEDID)
    };
    assert!(engine.handle(&end).is_none());
}

#[tokio::test(start_paused = true)]
async fn internal_callers_follow_the_config_switch() {
    let end = AmiEvent {
        caller_id_num: "901".to_string(),
        ..dial_end("ANSWER", LINKEDID)
    };

    let mut excluding = CorrelationEngine::new(EXTENSION.to_string(), IdSource::Linkedid, false);
    assert!(excluding.handle(&end).is_none());

    let mut including = CorrelationEngine::new(EXTENSION.to_string(), IdSource::Linkedid, true);
    let request = including.handle(&end).unwrap();
    assert_eq!(request.caller, "901");
}

#[tokio::test(start_paused = true)]
async fn events_without_call_ids_are_dropped() {
    let mut engine = engine();

    let mut end = dial_end("ANSWER", "");
    end.uniqueid = String::new();
    assert!(engine.handle(&end).is_none());

    // No digits in either identifier: normalization fails silently.
    let mut end = dial_end("ANSWER", "no-digits-here");
    end.uniqueid = String::new();
    assert!(engine.handle(&end).is_none());
}

#[tokio::test(start_paused = true)]
async fn two_calls_are_tracked_independently() {
    let mut engine = engine();

    engine.handle(&dial_begin(CALLER, "1706871234.10"));
    engine.handle(&dial_begin("09121112222", "1706871299.20"));
    assert_eq!(engine.stats().pending_calls, 2);

    let first = engine.handle(&dial_end("ANSWER", "1706871234.10")).unwrap();
    assert_eq!(first.caller, CALLER);

    let second = engine
        .handle(&dial_end("ANSWER", "1706871299.20"))
        .unwrap();
    assert_eq!(second.caller, "09121112222");
    assert_eq!(second.call_id, 170_687_129_920);
}

#[tokio::test(start_paused = true)]
async fn stale_state_is_evicted() {
    let mut engine = engine();

    engine.handle(&dial_begin(CALLER, LINKEDID));
    let stats = engine.stats();
    assert_eq!(stats.pending_calls, 1);
    assert_eq!(stats.ring_entries, 1);

    // Past the pending TTL (240s) and every coarse gate horizon.
    advance(Duration::from_secs(400)).await;

    // Any handled event triggers the rate-limited sweep.
    engine.handle(&AmiEvent::default());

    let stats = engine.stats();
    assert_eq!(stats.pending_calls, 0);
    assert_eq!(stats.ring_entries, 0);

    // The expired call can no longer resolve from the tracker.
    assert!(engine.handle(&dial_end("ANSWER", LINKEDID)).is_none());
}

#[tokio::test(start_paused = true)]
async fn sweep_is_rate_limited() {
    let mut engine = engine();

    engine.handle(&dial_begin(CALLER, LINKEDID));
    advance(Duration::from_secs(300)).await;

    // First event after the gap sweeps; within 5s nothing sweeps again,
    // so an entry created right after survives the next handle call.
    engine.handle(&AmiEvent::default());
    engine.handle(&dial_begin("09121112222", "1706871299.20"));
    engine.handle(&AmiEvent::default());
    assert_eq!(engine.stats().pending_calls, 1);
}
