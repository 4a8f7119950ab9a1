//! The tag/event cache entry.
//!
//! Extends the plain entry with grouping tags, a fixed expiry instant
//! independent of the TTL, and named-event subscriptions so host code can
//! bind invalidation to application events. Mutations arriving from inside
//! an event callback are a programming error and panic.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::expiry;
use crate::record::{self, RecordFields};
use crate::status::DirtyStatus;
use crate::storage::StorageDriver;

type Listener = Box<dyn FnMut(&mut TaggedEntry)>;

/// A per-key write-back cache entry with tags and event subscriptions.
///
/// Deletion here is eager: `delete` instructs the driver immediately and
/// only falls back to a pending flush when the driver errors. Stored
/// records found past their effective expiry are evicted while loading
/// (configurable via [`CacheConfig::evict_stale_on_load`]).
///
/// Like [`Entry`](crate::Entry), any pending dirty state is flushed exactly
/// once on drop.
pub struct TaggedEntry {
    driver: Arc<dyn StorageDriver>,
    group: String,
    key: String,
    value: Option<Value>,
    hit: bool,
    ttl: Option<Duration>,
    expire: Option<OffsetDateTime>,
    last_save: Option<OffsetDateTime>,
    tags: BTreeSet<String>,
    status: DirtyStatus,
    expired: Option<bool>,
    locked: bool,
    loaded: bool,
    listeners: HashMap<String, Vec<Listener>>,
    default_ttl: Duration,
    evict_stale_on_load: bool,
}

impl TaggedEntry {
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
            expire: None,
            last_save: None,
            tags: BTreeSet::new(),
            status: DirtyStatus::Clean,
            expired: None,
            locked: false,
            loaded: false,
            listeners: HashMap::new(),
            default_ttl: config.default_ttl(),
            evict_stale_on_load: config.evict_stale_on_load,
        }
    }

    /// Supply an initial TTL without marking the entry dirty; reconciled at
    /// first load.
    pub fn with_initial_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Supply initial tags without marking the entry dirty; reconciled at
    /// first load.
    pub fn with_initial_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn time_to_live(&self) -> Duration {
        self.ttl.unwrap_or(self.default_ttl)
    }

    pub fn expire_date(&self) -> Option<OffsetDateTime> {
        self.expire
    }

    pub fn last_save(&self) -> Option<OffsetDateTime> {
        self.last_save
    }

    pub fn status(&self) -> DirtyStatus {
        self.status
    }

    // ========================================================================
    // Core state machine
    // ========================================================================

    /// The cached value, lazily loading from storage when the entry is not
    /// currently a hit.
    pub fn value(&mut self) -> Option<Value> {
        if !self.hit {
            self.calculate_status();
        }
        self.value.clone()
    }

    /// Store a value in memory and mark a full write-back pending.
    pub fn set(&mut self, value: impl Into<Value>) -> bool {
        self.assert_unlocked("set");
        self.value = Some(value.into());
        self.hit = true;
        self.expired = None;
        self.last_save = Some(record::now_second());
        self.status = DirtyStatus::Dirty;
        true
    }

    pub fn is_hit(&self) -> bool {
        self.hit
    }

    /// Whether the value is past its effective expiry (the earlier of the
    /// fixed expiry date and `last_save + ttl`). Cached until the next
    /// mutation or reload.
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
        let expiry =
            expiry::effective_expiry(self.expire, self.last_save, Some(self.time_to_live()));
        expiry::is_stale_at(expiry, now)
    }

    /// Change the TTL. A metadata-only change on a never-loaded entry
    /// reconciles with storage first, so the eventual shallow write
    /// annotates the stored record instead of replacing it.
    pub fn live_for(&mut self, ttl: Duration) -> &mut Self {
        self.assert_unlocked("live_for");
        self.ensure_loaded();
        self.ttl = Some(ttl);
        self.expired = None;
        self.status.mark_meta_dirty();
        self
    }

    /// Clear the entry and eagerly delete its storage record.
    ///
    /// Always reports success; when the driver errors the delete is kept
    /// pending and retried at the next flush.
    pub fn delete(&mut self) -> bool {
        self.assert_unlocked("delete");
        self.delete_inner()
    }

    fn delete_inner(&mut self) -> bool {
        self.value = None;
        self.ttl = None;
        self.expire = None;
        self.last_save = None;
        self.expired = None;
        self.tags.clear();
        self.hit = false;
        match self.driver.delete(&self.group, &self.key) {
            Ok(()) => self.status = DirtyStatus::Clean,
            Err(error) => {
                warn!(
                    group = %self.group,
                    key = %self.key,
                    %error,
                    "Eager cache delete failed; deferring to flush"
                );
                self.status = DirtyStatus::Deleted;
            }
        }
        true
    }

    /// Flush pending state to storage. Same contract as
    /// [`Entry::sync_to_storage`](crate::Entry::sync_to_storage).
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
        self.expire = None;
        self.last_save = None;
        self.expired = None;
        self.tags.clear();
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
        let (record, stamped) = record::encode(
            RecordFields {
                value: self.value.as_ref(),
                ttl: Some(self.time_to_live()),
                expire: self.expire,
                last_save: self.last_save,
                tags: &self.tags,
            },
            shallow,
            OffsetDateTime::now_utc(),
        );
        self.driver.write(&self.group, &self.key, &record)?;
        self.last_save = Some(stamped);
        Ok(())
    }

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
        let mut stored = stored
            .filter(|record| !record.is_empty())
            .map(|record| record::decode(&record));

        // Stored records already past their effective expiry are discarded
        // at the driver and treated as a miss.
        if self.evict_stale_on_load {
            if let Some(decoded) = &stored {
                let expiry =
                    expiry::effective_expiry(decoded.expire, decoded.last_save, decoded.ttl);
                if let Some(instant) = expiry {
                    if expiry::should_evict(instant, OffsetDateTime::now_utc()) {
                        debug!(
                            group = %self.group,
                            key = %self.key,
                            "Evicting stale record found at load"
                        );
                        if let Err(error) = self.driver.delete(&self.group, &self.key) {
                            warn!(
                                group = %self.group,
                                key = %self.key,
                                %error,
                                "Failed to evict stale record"
                            );
                        }
                        stored = None;
                    }
                }
            }
        }

        let stored_hit = stored.is_some();
        let stored = stored.unwrap_or_default();

        let stored_ttl = stored.ttl.unwrap_or(self.default_ttl);
        if self.value.is_none() {
            self.value = stored.value.clone();
        }
        let ttl = *self.ttl.get_or_insert(stored_ttl);
        if self.last_save.is_none() {
            self.last_save = stored.last_save;
        }
        if self.expire.is_none() {
            self.expire = stored.expire;
        }
        if self.tags.is_empty() {
            self.tags = stored.tags.clone();
        }

        self.hit = stored_hit || self.value.is_some();
        self.expired = None;
        self.loaded = true;

        self.status = if self.value != stored.value {
            DirtyStatus::Dirty
        } else if ttl != stored_ttl || self.expire != stored.expire || self.tags != stored.tags {
            DirtyStatus::DirtyShallow
        } else {
            DirtyStatus::Clean
        };
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Whether *all* of the given tags are present.
    pub fn has_tag<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter().all(|tag| self.tags.contains(tag.as_ref()))
    }

    /// Add tags. Returns `true` and writes back immediately when the set
    /// changed; `false` without touching the driver otherwise.
    pub fn add_tags<I, S>(&mut self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assert_unlocked("add_tags");
        self.ensure_loaded();
        let mut next = self.tags.clone();
        next.extend(tags.into_iter().map(Into::into));
        self.apply_tags(next)
    }

    /// Remove tags; same change/no-change contract as `add_tags`.
    pub fn remove_tags<I, S>(&mut self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.assert_unlocked("remove_tags");
        self.ensure_loaded();
        let mut next = self.tags.clone();
        for tag in tags {
            next.remove(tag.as_ref());
        }
        self.apply_tags(next)
    }

    /// Replace the tag set wholesale; same change/no-change contract as
    /// `add_tags`.
    pub fn use_tags<I, S>(&mut self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assert_unlocked("use_tags");
        self.ensure_loaded();
        let next = tags.into_iter().map(Into::into).collect();
        self.apply_tags(next)
    }

    fn apply_tags(&mut self, next: BTreeSet<String>) -> bool {
        if next == self.tags {
            return false;
        }
        self.tags = next;
        self.status.mark_meta_dirty();
        // The result of the immediate write-back is deliberately ignored: a
        // failure leaves the dirty state pending for the next flush.
        self.sync_to_storage();
        true
    }

    // ========================================================================
    // Fixed expiry
    // ========================================================================

    /// Set the absolute expiry instant (normalized to UTC at one-second
    /// resolution), write back immediately, and mark the entry a miss so
    /// the next value access reloads against the new expiry.
    pub fn expires_on(&mut self, instant: OffsetDateTime) -> &mut Self {
        self.assert_unlocked("expires_on");
        self.ensure_loaded();
        self.expire = Some(record::truncate_to_second(instant));
        self.expired = None;
        self.status.mark_meta_dirty();
        self.sync_to_storage();
        self.hit = false;
        self
    }

    /// Expire the entry `ttl` from now.
    pub fn expires_after(&mut self, ttl: Duration) -> &mut Self {
        self.expires_on(OffsetDateTime::now_utc() + ttl)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribe a callback to a named application event.
    ///
    /// The callback runs with the entry locked: calling a mutating
    /// operation from inside it panics.
    pub fn listen(
        &mut self,
        event: impl Into<String>,
        callback: impl FnMut(&mut TaggedEntry) + 'static,
    ) -> &mut Self {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Box::new(callback));
        self
    }

    /// Subscribe the built-in invalidation behavior: when the event fires,
    /// the entry becomes a miss and its storage record is deleted.
    pub fn listen_and_delete(&mut self, event: impl Into<String>) -> &mut Self {
        self.listen(event, |entry| {
            entry.delete_inner();
        })
    }

    /// Deliver a named event to this entry's listeners.
    ///
    /// This is the seam the host's event bus calls when the event fires.
    /// Returns the number of listeners invoked; subscriptions persist for
    /// subsequent firings.
    pub fn dispatch(&mut self, event: &str) -> usize {
        let Some(mut callbacks) = self.listeners.remove(event) else {
            return 0;
        };
        debug!(
            group = %self.group,
            key = %self.key,
            event,
            listeners = callbacks.len(),
            "Dispatching cache event"
        );

        self.locked = true;
        for callback in callbacks.iter_mut() {
            callback(self);
        }
        self.locked = false;

        let count = callbacks.len();
        // Listeners registered during dispatch land after the original ones.
        let mut added = self.listeners.remove(event).unwrap_or_default();
        callbacks.append(&mut added);
        self.listeners.insert(event.to_string(), callbacks);
        count
    }

    fn assert_unlocked(&self, op: &'static str) {
        assert!(
            !self.locked,
            "reentrant cache mutation: `{op}` called from an event callback on `{}/{}`",
            self.group, self.key
        );
    }
}

impl Drop for TaggedEntry {
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

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json::json;
    use time::macros::datetime;

    use crate::record::StorageRecord;
    use crate::storage::MemoryDriver;
    use crate::storage::testing::FailingDriver;

    use super::*;

    const PAST: OffsetDateTime = datetime!(2020-01-01 00:00:00 UTC);

    fn no_evict_config() -> CacheConfig {
        CacheConfig {
            evict_stale_on_load: false,
            ..Default::default()
        }
    }

    fn seeded(group: &str, key: &str, record: StorageRecord) -> Arc<MemoryDriver> {
        let driver = Arc::new(MemoryDriver::new());
        driver.write(group, key, &record).expect("seed");
        driver
    }

    fn tag_set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn add_tags_reports_change_once() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        assert!(entry.add_tags(["a"]));
        assert_eq!(driver.stats().writes, 1);

        assert!(!entry.add_tags(["a"]));
        assert_eq!(driver.stats().writes, 1);
    }

    #[test]
    fn tag_changes_write_back_immediately() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        entry.add_tags(["sidebar", "posts"]);

        let stored = driver.read("posts", "p1").expect("read").expect("record");
        assert_eq!(stored.tags, tag_set(&["posts", "sidebar"]));
    }

    #[test]
    fn has_tag_requires_every_given_tag() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.use_tags(["a", "b"]);
        assert!(entry.has_tag(["a"]));
        assert!(entry.has_tag(["a", "b"]));
        assert!(!entry.has_tag(["a", "c"]));
    }

    #[test]
    fn remove_and_use_tags_follow_the_change_contract() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.use_tags(["a", "b"]);
        assert!(entry.remove_tags(["b"]));
        assert!(!entry.remove_tags(["b"]));
        assert_eq!(entry.tags(), &tag_set(&["a"]));

        assert!(entry.use_tags(["x"]));
        assert!(!entry.use_tags(["x"]));
        assert_eq!(entry.tags(), &tag_set(&["x"]));
    }

    #[test]
    fn tags_adopt_from_storage_on_load() {
        let record = StorageRecord {
            value: Some(json!("x")),
            tags: tag_set(&["a", "b"]),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        assert_eq!(entry.value(), Some(json!("x")));
        assert_eq!(entry.tags(), &tag_set(&["a", "b"]));
        assert_eq!(entry.status(), DirtyStatus::Clean);
    }

    #[test]
    fn tag_mutation_on_an_unloaded_entry_keeps_the_stored_value() {
        let record = StorageRecord {
            value: Some(json!("x")),
            tags: tag_set(&["a"]),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        assert!(entry.add_tags(["b"]));

        let stored = driver.read("posts", "p1").expect("read").expect("record");
        assert_eq!(stored.value, Some(json!("x")));
        assert_eq!(stored.tags, tag_set(&["a", "b"]));
    }

    #[test]
    fn initial_tags_reconcile_to_dirty_shallow() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver, "posts", "p1").with_initial_tags(["a"]);

        entry.value();
        assert_eq!(entry.status(), DirtyStatus::DirtyShallow);
    }

    #[test]
    fn listeners_run_on_dispatch_and_survive_it() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        entry.listen("post.saved", move |_| {
            seen.set(seen.get() + 1);
        });

        assert_eq!(entry.dispatch("unrelated"), 0);
        assert_eq!(entry.dispatch("post.saved"), 1);
        assert_eq!(entry.dispatch("post.saved"), 1);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn listen_and_delete_invalidates_on_event() {
        let record = StorageRecord {
            value: Some(json!("rendered sidebar")),
            ..Default::default()
        };
        let driver = seeded("fragments", "sidebar", record);
        let mut entry = TaggedEntry::new(driver.clone(), "fragments", "sidebar");

        assert_eq!(entry.value(), Some(json!("rendered sidebar")));
        entry.listen_and_delete("post.saved");

        entry.dispatch("post.saved");
        assert!(!entry.is_hit());
        assert_eq!(entry.status(), DirtyStatus::Clean);
        assert!(driver.read("fragments", "sidebar").expect("read").is_none());
    }

    #[test]
    #[should_panic(expected = "reentrant cache mutation")]
    fn mutating_from_a_callback_panics() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.listen("post.saved", |entry| {
            entry.set("nope");
        });
        entry.dispatch("post.saved");
    }

    #[test]
    #[should_panic(expected = "reentrant cache mutation")]
    fn tag_mutation_from_a_callback_panics() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.listen("post.saved", |entry| {
            entry.add_tags(["late"]);
        });
        entry.dispatch("post.saved");
    }

    #[test]
    fn lock_clears_after_dispatch() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.listen("post.saved", |_| {});
        entry.dispatch("post.saved");

        assert!(entry.set("fine"));
    }

    #[test]
    fn expires_on_persists_and_forces_a_reload() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        entry.set("x");
        assert!(entry.sync_to_storage());

        let expire = datetime!(2999-01-01 00:00:00 UTC);
        entry.expires_on(expire);
        assert!(!entry.is_hit());

        let stored = driver.read("posts", "p1").expect("read").expect("record");
        assert_eq!(stored.expire.as_deref(), Some("2999-01-01T00:00:00Z"));

        assert_eq!(entry.value(), Some(json!("x")));
        assert!(entry.is_hit());
        assert_eq!(entry.expire_date(), Some(expire));
    }

    #[test]
    fn expires_after_anchors_at_now() {
        let driver = Arc::new(MemoryDriver::new());
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.set("x");
        entry.expires_after(Duration::from_secs(3600));

        let expire = entry.expire_date().expect("expiry set");
        let distance = expire - (OffsetDateTime::now_utc() + Duration::from_secs(3600));
        assert!(distance.whole_seconds().abs() < 5);
    }

    #[test]
    fn effective_expiry_is_the_earlier_policy() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ttl: Some(100),
            last_save: Some("2020-01-01T00:00:00Z".to_string()),
            expire: Some("2020-01-01T00:00:50Z".to_string()),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::with_config(driver, &no_evict_config(), "posts", "p1");
        entry.value();

        // Past the fixed expiry, still inside the TTL window.
        assert!(entry.is_expired_at(PAST + Duration::from_secs(75)));
        assert!(!entry.is_expired_at(PAST + Duration::from_secs(49)));
    }

    #[test]
    fn ttl_alone_bounds_life_without_a_fixed_expiry() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ttl: Some(100),
            last_save: Some("2020-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::with_config(driver, &no_evict_config(), "posts", "p1");
        entry.value();

        assert!(!entry.is_expired_at(PAST + Duration::from_secs(75)));
        assert!(entry.is_expired_at(PAST + Duration::from_secs(101)));
    }

    #[test]
    fn stale_record_is_evicted_on_load() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ttl: Some(10),
            last_save: Some("2020-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        assert!(entry.value().is_none());
        assert!(!entry.is_hit());
        assert_eq!(driver.stats().deletes, 1);
        assert!(driver.read("posts", "p1").expect("read").is_none());
    }

    #[test]
    fn fresh_record_is_not_evicted_on_load() {
        let record = StorageRecord {
            value: Some(json!("x")),
            expire: Some("2999-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        assert_eq!(entry.value(), Some(json!("x")));
        assert_eq!(driver.stats().deletes, 0);
    }

    #[test]
    fn record_without_expiry_inputs_is_never_evicted() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        assert_eq!(entry.value(), Some(json!("x")));
        assert_eq!(driver.stats().deletes, 0);
    }

    #[test]
    fn delete_is_eager() {
        let record = StorageRecord {
            value: Some(json!("x")),
            ..Default::default()
        };
        let driver = seeded("posts", "p1", record);
        let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1");

        entry.value();
        assert!(entry.delete());
        assert_eq!(driver.stats().deletes, 1);
        assert_eq!(entry.status(), DirtyStatus::Clean);
        assert!(entry.tags().is_empty());
    }

    #[test]
    fn failed_eager_delete_stays_pending() {
        let driver = Arc::new(FailingDriver::default());
        driver
            .inner
            .write(
                "posts",
                "p1",
                &StorageRecord {
                    value: Some(json!("x")),
                    ..Default::default()
                },
            )
            .expect("seed");
        let mut entry = TaggedEntry::new(driver, "posts", "p1");

        entry.value();
        assert!(entry.delete());
        assert_eq!(entry.status(), DirtyStatus::Deleted);
        assert!(!entry.is_hit());
    }

    #[test]
    fn flush_on_drop_persists_tags_and_expiry() {
        let driver = Arc::new(MemoryDriver::new());
        {
            let mut entry = TaggedEntry::new(driver.clone(), "posts", "p1")
                .with_initial_tags(["a"]);
            entry.set(7);
        }

        let stored = driver.read("posts", "p1").expect("read").expect("record");
        assert_eq!(stored.value, Some(json!(7)));
        assert_eq!(stored.tags, tag_set(&["a"]));
    }
}
