//! The simple TTL-only cache entry.
//!
//! One entry per `(group, key)`. The entry lazily loads from the storage
//! driver on first value access, tracks how its in-memory state diverges
//! from storage through [`DirtyStatus`], and writes back on demand or when
//! dropped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::expiry;
use crate::record::{self, RecordFields};
use crate::status::DirtyStatus;
use crate::storage::StorageDriver;

/// A per-key write-back cache entry.
///
/// Storage failures never escape as errors: write-backs report `false` and
/// the entry resynchronizes against whatever storage actually holds, so the
/// caller's next attempt starts from reality.
///
/// Any pending dirty state is flushed to storage exactly once when the
/// entry is dropped.
pub struct Entry {
    driver: Arc<dyn StorageDriver>,
    group: String,
    key: String,
    value: Option<Value>,
    hit: bool,
    ttl: Option<Duration>,
    last_save: Option<OffsetDateTime>,
    status: DirtyStatus,
    expired: Option<bool>,
    loaded: bool,
    default_ttl: Duration,
}

impl Entry {
    /// Create an entry with the default configuration.
    ///
    /// The driver is not touched until the first value access.
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        group: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::with_config(driver, &CacheConfig::default(), group, key)
    }

    pub fn with_config(
        driver: Arc<dyn StorageDriver>,
        config: &CacheConfig,
        group: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            group: group.into(),
            key: key.into(),
            value: None,
            hit: false,
            ttl: None,
            last_save: None,
            status: DirtyStatus::Clean,
            expired: None,
            loaded: false,
            default_ttl: config.default_ttl(),
        }
    }

    /// Supply an initial TTL without marking the entry dirty.
    ///
    /// Reconciliation at first load decides whether it differs from what
    /// storage holds.
    pub fn with_initial_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The TTL in effect: caller-supplied, adopted from storage, or the
    /// configured default.
    pub fn time_to_live(&self) -> Duration {
        self.ttl.unwrap_or(self.default_ttl)
    }

    pub fn last_save(&self) -> Option<OffsetDateTime> {
        self.last_save
    }

    pub fn status(&self) -> DirtyStatus {
        self.status
    }

    /// The cached value, lazily loading from storage when the entry is not
    /// currently a hit.
    ///
    /// A missing key is not an error; it leaves the entry a miss and
    /// returns `None`.
    pub fn value(&mut self) -> Option<Value> {
        if !self.hit {
            self.calculate_status();
        }
        self.value.clone()
    }

    /// Store a value in memory and mark a full write-back pending.
    ///
    /// Always reports success; persistence happens at the next flush, and a
    /// failed flush keeps the dirty state for retry.
    pub fn set(&mut self, value: impl Into<Value>) -> bool {
        self.value = Some(value.into());
        self.hit = true;
        self.expired = None;
        self.last_save = Some(record::now_second());
        self.status = DirtyStatus::Dirty;
        true
    }

    /// Whether a value is present, without triggering a load.
    pub fn is_hit(&self) -> bool {
        self.hit
    }

    /// Whether the value is past its expiry.
    ///
    /// Misses are never expired. The result is cached until `set` or
    /// `live_for` invalidates it.
    pub fn is_expired(&mut self) -> bool {
        if !self.hit {
            return false;
        }
        if let Some(cached) = self.expired {
            return cached;
        }
        let expired = self.is_expired_at(OffsetDateTime::now_utc());
        self.expired = Some(expired);
        expired
    }

    /// Expiry check against an explicit instant, bypassing the cached
    /// result.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        if !self.hit {
            return false;
        }
        let expiry = expiry::effective_expiry(None, self.last_save, Some(self.time_to_live()));
        expiry::is_stale_at(expiry, now)
    }

    /// Change the TTL. A clean entry becomes `DirtyShallow`; a pending full
    /// write or delete already carries the change.
    ///
    /// A metadata-only change on a never-loaded entry reconciles with
    /// storage first, so the eventual shallow write annotates the stored
    /// record instead of replacing it with an empty one.
    pub fn live_for(&mut self, ttl: Duration) -> &mut Self {
        self.ensure_loaded();
        self.ttl = Some(ttl);
        self.expired = None;
        self.status.mark_meta_dirty();
        self
    }

    /// Clear the value and mark the storage record for deletion.
    ///
    /// The storage delete is deferred to the next flush; the call itself
    /// always reports success.
    pub fn delete(&mut self) -> bool {
        self.value = None;
        self.ttl = None;
        self.last_save = None;
        self.expired = None;
        self.hit = false;
        self.status = DirtyStatus::Deleted;
        true
    }

    /// Flush pending state to storage.
    ///
    /// Clean entries return `true` without touching the driver. On a driver
    /// failure the entry resynchronizes from a fresh read and returns
    /// `false`.
    pub fn sync_to_storage(&mut self) -> bool {
        let outcome = match self.status {
            DirtyStatus::Clean => return true,
            DirtyStatus::DirtyShallow => self.write_back(true),
            DirtyStatus::Dirty => self.write_back(false),
            DirtyStatus::Deleted => self.driver.delete(&self.group, &self.key),
        };

        match outcome {
            Ok(()) => {
                self.status = DirtyStatus::Clean;
                true
            }
            Err(error) => {
                warn!(
                    group = %self.group,
                    key = %self.key,
                    %error,
                    "Cache write-back failed; resynchronizing from storage"
                );
                self.calculate_status();
                false
            }
        }
    }

    /// Discard in-memory state and reload from storage.
    pub fn sync_from_storage(&mut self) -> bool {
        self.value = None;
        self.ttl = None;
        self.last_save = None;
        self.expired = None;
        self.hit = false;
        self.status = DirtyStatus::Clean;
        self.calculate_status();
        true
    }

    fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.calculate_status();
        }
    }

    fn write_back(&mut self, shallow: bool) -> Result<(), StorageError> {
        let tags = BTreeSet::new();
        let (record, stamped) = record::encode(
            RecordFields {
                value: self.value.as_ref(),
                ttl: Some(self.time_to_live()),
                expire: None,
                last_save: self.last_save,
                tags: &tags,
            },
            shallow,
            OffsetDateTime::now_utc(),
        );
        self.driver.write(&self.group, &self.key, &record)?;
        self.last_save = Some(stamped);
        Ok(())
    }

    /// Reconcile in-memory state with what storage holds.
    ///
    /// Stored fields are adopted only where the in-memory side has nothing,
    /// so a value `set` before the first load survives a stale storage
    /// read. The resulting status records how the reconciled state differs
    /// from storage.
    fn calculate_status(&mut self) {
        let stored = match self.driver.read(&self.group, &self.key) {
            Ok(record) => record,
            Err(error) => {
                warn!(
                    group = %self.group,
                    key = %self.key,
                    %error,
                    "Cache read failed; treating as miss"
                );
                None
            }
        };
        let stored = stored
            .filter(|record| !record.is_empty())
            .map(|record| record::decode(&record));
        let stored_hit = stored.is_some();
        let stored = stored.unwrap_or_default();

        // The comparison baseline defaults absent stored TTLs the same way
        // adoption does, so an untouched entry reconciles to Clean.
        let stored_ttl = stored.ttl.unwrap_or(self.default_ttl);
        if self.value.is_none() {
            self.value = stored.value.clone();
        }
        let ttl = *self.ttl.get_or_insert(stored_ttl);
        if self.last_save.is_none() {
            self.last_save = stored.last_save;
        }

        self.hit = stored_hit || self.value.is_some();
        self.expired = None;
        self.loaded = true;

        self.status = if self.value != stored.value {
            DirtyStatus::Dirty
        } else if ttl != stored_ttl {
            DirtyStatus::DirtyShallow
        } else {
            DirtyStatus::Clean
        };
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        if !self.status.is_clean() && !self.sync_to_storage() {
            warn!(
                group = %self.group,
                key = %self.key,
                "Dropping cache entry with unsynced state"
            );
        }
    }
}
