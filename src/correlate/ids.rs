//! Canonical call identifiers.
//!
//! Asterisk groups the channels of one logical call under a `Linkedid` and
//! gives every channel its own `Uniqueid`. Both look like `1706871234.56`
//! (epoch seconds, a dot, a per-boot sequence number). CDR-facing systems
//! want a single integer key, so identifiers are normalized by keeping only
//! the digits: `1706871234.56` becomes `170687123456`.

use serde::Deserialize;

use crate::event::AmiEvent;

/// Which raw identifier to prefer when deriving the canonical call id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSource {
    /// Prefer `Linkedid`, fall back to `Uniqueid`.
    #[default]
    Linkedid,
    /// Prefer `Uniqueid`, fall back to `Linkedid`.
    Uniqueid,
}

/// Normalizes a raw call identifier into its canonical integer form.
///
/// Strips every non-digit character and parses the remainder as `u64`.
/// Returns `None` when no digits remain or the digit run does not fit in a
/// `u64`. Pure and infallible; absence of an identifier is a normal outcome.
#[must_use]
pub fn normalize(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Derives the canonical call id for an event.
///
/// Picks the preferred raw identifier per `source`, falling back to the
/// other when the preferred one is empty, then normalizes it.
#[must_use]
pub fn canonical_call_id(event: &AmiEvent, source: IdSource) -> Option<u64> {
    let linked = event.linkedid.trim();
    let unique = event.uniqueid.trim();

    let raw = match source {
        IdSource::Linkedid if !linked.is_empty() => linked,
        IdSource::Uniqueid if !unique.is_empty() => unique,
        IdSource::Linkedid => unique,
        IdSource::Uniqueid => linked,
    };

    normalize(raw)
}
