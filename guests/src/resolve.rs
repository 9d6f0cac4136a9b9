//! Scan code resolution against the local collection.

use crate::types::{GuestRecord, SHORT_CODE_LEN};

/// Strip surrounding whitespace left by scanners and manual entry.
#[must_use]
pub fn normalize_code(raw: &str) -> &str {
    raw.trim()
}

/// Whether a code that missed locally is worth asking the backend about.
///
/// Identifiers are at least [`SHORT_CODE_LEN`] characters long, so a shorter
/// code can be neither a full id nor a short code.
#[must_use]
pub fn is_lookup_candidate(code: &str) -> bool {
    code.chars().count() >= SHORT_CODE_LEN
}

/// Find the guest a normalized code refers to.
///
/// An exact id match anywhere in the collection wins over a short-code match;
/// among short-code matches the first in collection order wins. An empty code
/// matches nobody.
#[must_use]
pub fn resolve_local<'a>(guests: &'a [GuestRecord], code: &str) -> Option<&'a GuestRecord> {
    if code.is_empty() {
        return None;
    }

    guests
        .iter()
        .find(|guest| guest.id.as_str() == code)
        .or_else(|| guests.iter().find(|guest| guest.id.has_short_code(code)))
}
