//! Extension matching for AMI dial events.
//!
//! Decides whether a dial event concerns the watched extension. Plain
//! substring containment is not enough: extension `902` must not match
//! inside `9020` or `1902`, because Asterisk channel names and dial strings
//! embed many numerically overlapping identifiers. Every channel-shaped
//! field is therefore checked with a digit-boundary rule: the extension has
//! to occur as a standalone digit run.

use crate::event::AmiEvent;

/// Channel technology prefix for locally-originated legs.
const LOCAL_CHANNEL_PREFIX: &str = "Local/";

/// Returns true when `event` concerns `extension`.
///
/// An event matches when any of the following holds:
///
/// 1. `DestCallerIDNum` equals the extension exactly;
/// 2. the extension occurs as a standalone digit run in `DestChannel`;
/// 3. same rule against `DialString`;
/// 4. `Channel` starts with `Local/` and the rule matches `Channel`
///    (locally-originated legs name the target extension in their own
///    channel, e.g. `Local/FMPR-9020@from-queue-...`).
#[must_use]
pub fn concerns_extension(event: &AmiEvent, extension: &str) -> bool {
    if extension.is_empty() {
        return false;
    }

    if event.dest_caller_id_num == extension {
        return true;
    }
    if contains_standalone(&event.dest_channel, extension) {
        return true;
    }
    if contains_standalone(&event.dial_string, extension) {
        return true;
    }

    event.channel.starts_with(LOCAL_CHANNEL_PREFIX)
        && contains_standalone(&event.channel, extension)
}

/// Returns true when `needle` occurs in `haystack` with no adjacent digit
/// on either side.
#[must_use]
pub fn contains_standalone(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    let bytes = haystack.as_bytes();
    // A rejected occurrence is re-searched from its second character; the
    // step has to be a whole char so the slice stays on a boundary.
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();

        let digit_before = start > 0 && bytes[start - 1].is_ascii_digit();
        let digit_after = end < bytes.len() && bytes[end].is_ascii_digit();
        if !digit_before && !digit_after {
            return true;
        }

        from = start + step;
    }
    false
}
