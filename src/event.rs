//! Typed AMI events.
//!
//! The AMI wire format is a flat bag of `Key: Value` strings. This module
//! lifts the fields the correlation engine cares about into a struct with
//! named fields, so classification never works against a dynamic map.
//! Absent fields are represented as empty strings, mirroring how Asterisk
//! omits them.

use std::collections::HashMap;

/// Classification of an AMI event by its `Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventKind {
    /// `DialBegin`: a dial attempt started ringing a channel.
    DialBegin,
    /// `DialEnd`: a dial attempt concluded; `DialStatus` carries the outcome.
    DialEnd,
    /// Any other event. Ignored by the engine.
    #[default]
    Other,
}

impl EventKind {
    /// Classifies an `Event` header value.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        match name {
            "DialBegin" => Self::DialBegin,
            "DialEnd" => Self::DialEnd,
            _ => Self::Other,
        }
    }
}

/// One AMI event with the fields relevant to call correlation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AmiEvent {
    /// Classified `Event` header.
    pub kind: EventKind,
    /// `CallerIDNum`: number of the calling party.
    pub caller_id_num: String,
    /// `DestCallerIDNum`: number of the called party.
    pub dest_caller_id_num: String,
    /// `Channel`: channel name of the originating leg.
    pub channel: String,
    /// `DestChannel`: channel name of the ringing leg.
    pub dest_channel: String,
    /// `DialString`: the technology/resource string being dialed.
    pub dial_string: String,
    /// `DialStatus`: outcome of the dial attempt (`DialEnd` only).
    pub dial_status: String,
    /// `Linkedid`: identifier shared by all channels of one logical call.
    pub linkedid: String,
    /// `Uniqueid`: identifier of this channel.
    pub uniqueid: String,
}

impl AmiEvent {
    /// Builds an event from a parsed AMI frame.
    ///
    /// Frame keys are expected lowercased (the protocol reader does this).
    /// Returns `None` for frames without an `Event` header, i.e. action
    /// responses and follow-up packets.
    #[must_use]
    pub fn from_frame(frame: &HashMap<String, String>) -> Option<Self> {
        let name = frame.get("event")?;
        let field = |key: &str| frame.get(key).cloned().unwrap_or_default();

        Some(Self {
            kind: EventKind::classify(name),
            caller_id_num: field("calleridnum"),
            dest_caller_id_num: field("destcalleridnum"),
            channel: field("channel"),
            dest_channel: field("destchannel"),
            dial_string: field("dialstring"),
            dial_status: field("dialstatus"),
            linkedid: field("linkedid"),
            uniqueid: field("uniqueid"),
        })
    }

    /// The raw call-group identifier: `Linkedid`, falling back to
    /// `Uniqueid` when the linked id is absent. Empty when neither is set.
    #[must_use]
    pub fn call_group_id(&self) -> &str {
        let linked = self.linkedid.trim();
        if linked.is_empty() {
            self.uniqueid.trim()
        } else {
            linked
        }
    }

    /// True when this is a `DialEnd` whose outcome is an answered call.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.kind == EventKind::DialEnd && self.dial_status.eq_ignore_ascii_case("ANSWER")
    }
}
