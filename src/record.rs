//! Persisted record layout and codec.
//!
//! Converts a live entry's fields into the flat record the storage driver
//! persists, and back. All date handling lives here: instants are UTC,
//! serialized as RFC 3339 strings, and truncated to one-second resolution
//! so a round-trip through storage compares equal.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

/// Flat record persisted by the storage driver.
///
/// Every field is optional: decoding tolerates records written by older
/// hosts or foreign tooling by falling back per-field instead of erroring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    /// The cached payload. Absent when only metadata was ever persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Relative validity in seconds, anchored at `last_save`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Absolute expiry instant, RFC 3339 UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<String>,
    /// Instant the value was last considered saved, RFC 3339 UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_save: Option<String>,
    /// Grouping labels for bulk invalidation.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl StorageRecord {
    /// A record with every field absent decodes as a cache miss.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.ttl.is_none()
            && self.expire.is_none()
            && self.last_save.is_none()
            && self.tags.is_empty()
    }
}

/// In-memory view of a decoded record.
#[derive(Debug, Clone, Default)]
pub(crate) struct DecodedRecord {
    pub value: Option<Value>,
    pub ttl: Option<Duration>,
    pub expire: Option<OffsetDateTime>,
    pub last_save: Option<OffsetDateTime>,
    pub tags: BTreeSet<String>,
}

/// Borrowed entry fields handed to `encode`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordFields<'a> {
    pub value: Option<&'a Value>,
    pub ttl: Option<Duration>,
    pub expire: Option<OffsetDateTime>,
    pub last_save: Option<OffsetDateTime>,
    pub tags: &'a BTreeSet<String>,
}

/// Encode entry fields into the persisted record.
///
/// The record always carries the full state; `shallow` only selects the
/// `last_save` rule: a shallow (metadata-only) write preserves an existing
/// stamp, anything else stamps `now`. Returns the record together with the
/// stamp that went into it so the entry can mirror it.
pub(crate) fn encode(
    fields: RecordFields<'_>,
    shallow: bool,
    now: OffsetDateTime,
) -> (StorageRecord, OffsetDateTime) {
    let last_save = match fields.last_save {
        Some(existing) if shallow => existing,
        _ => truncate_to_second(now),
    };

    let record = StorageRecord {
        value: fields.value.cloned(),
        ttl: fields.ttl.map(|ttl| ttl.as_secs()),
        expire: fields.expire.and_then(format_timestamp),
        last_save: format_timestamp(last_save),
        tags: fields.tags.clone(),
    };

    (record, last_save)
}

/// Decode a persisted record. Never fails: each field falls back on its own.
pub(crate) fn decode(record: &StorageRecord) -> DecodedRecord {
    DecodedRecord {
        value: record.value.clone(),
        ttl: record.ttl.map(Duration::from_secs),
        expire: record.expire.as_deref().and_then(parse_timestamp),
        last_save: record.last_save.as_deref().and_then(parse_timestamp),
        tags: record.tags.clone(),
    }
}

/// Normalize an instant to UTC at one-second resolution.
pub(crate) fn truncate_to_second(instant: OffsetDateTime) -> OffsetDateTime {
    let utc = instant.to_offset(UtcOffset::UTC);
    utc.replace_nanosecond(0).unwrap_or(utc)
}

/// The current UTC instant at one-second resolution.
pub(crate) fn now_second() -> OffsetDateTime {
    truncate_to_second(OffsetDateTime::now_utc())
}

fn format_timestamp(instant: OffsetDateTime) -> Option<String> {
    truncate_to_second(instant).format(&Rfc3339).ok()
}

fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if raw.is_empty() {
        return None;
    }
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(parsed) => Some(truncate_to_second(parsed)),
        Err(error) => {
            debug!(raw, %error, "Discarding unparsable timestamp in cache record");
            None
        }
    }
}
