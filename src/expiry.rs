//! Expiration policy.
//!
//! Two independent inputs can bound a value's life: a relative TTL anchored
//! at the last save, and a fixed expiry instant. When both exist the value
//! goes stale at whichever boundary comes first.

use std::time::Duration;

use time::OffsetDateTime;

/// The instant at which a value stops being valid, if any.
///
/// Earlier of the fixed expiry and `last_save + ttl`; either alone when only
/// one exists; `None` means the value never expires through this mechanism.
pub(crate) fn effective_expiry(
    expire: Option<OffsetDateTime>,
    last_save: Option<OffsetDateTime>,
    ttl: Option<Duration>,
) -> Option<OffsetDateTime> {
    let from_ttl = match (last_save, ttl) {
        (Some(anchor), Some(ttl)) => Some(anchor + ttl),
        _ => None,
    };

    match (expire, from_ttl) {
        (Some(fixed), Some(relative)) => Some(fixed.min(relative)),
        (fixed, relative) => fixed.or(relative),
    }
}

/// Whether a value with the given effective expiry is stale at `now`.
pub(crate) fn is_stale_at(expiry: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    expiry.is_some_and(|instant| instant <= now)
}

/// Whether a stored record found at load time should be evicted.
///
/// Eviction happens once the effective expiry is in the past: a record whose
/// expiry is still ahead stays untouched.
pub(crate) fn should_evict(expiry: OffsetDateTime, now: OffsetDateTime) -> bool {
    expiry <= now
}
