//! Caller-owned cache arena.
//!
//! Hosts own a pool of tagged entries keyed by `(group, key)`, created on
//! demand, all sharing one driver and configuration. The pool is also the
//! fan-out point for named events and for tag-scoped bulk invalidation.
//! Dropping the pool drops every entry, which flushes any pending state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::CacheConfig;
use crate::events::EventQueue;
use crate::storage::StorageDriver;
use crate::tagged::TaggedEntry;

pub struct CachePool {
    driver: Arc<dyn StorageDriver>,
    config: CacheConfig,
    entries: HashMap<(String, String), TaggedEntry>,
}

impl CachePool {
    pub fn new(driver: Arc<dyn StorageDriver>, config: CacheConfig) -> Self {
        Self {
            driver,
            config,
            entries: HashMap::new(),
        }
    }

    /// The entry for `(group, key)`, created on first use.
    pub fn entry(
        &mut self,
        group: impl Into<String>,
        key: impl Into<String>,
    ) -> &mut TaggedEntry {
        let id = (group.into(), key.into());
        let driver = Arc::clone(&self.driver);
        let config = self.config.clone();
        self.entries.entry(id).or_insert_with_key(|(group, key)| {
            TaggedEntry::with_config(driver, &config, group.clone(), key.clone())
        })
    }

    /// The entry for `(group, key)` if the pool already owns one.
    pub fn get(&self, group: &str, key: &str) -> Option<&TaggedEntry> {
        self.entries.get(&(group.to_string(), key.to_string()))
    }

    /// Number of owned entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver a named event to every owned entry.
    ///
    /// Returns the number of listeners invoked across the pool.
    pub fn fire(&mut self, event: &str) -> usize {
        let mut delivered = 0;
        for entry in self.entries.values_mut() {
            delivered += entry.dispatch(event);
        }
        if delivered > 0 {
            info!(event, delivered, "Cache event delivered");
        }
        delivered
    }

    /// Drain up to `limit` queued events and deliver each in order.
    pub fn consume(&mut self, queue: &EventQueue, limit: usize) -> usize {
        let mut delivered = 0;
        for event in queue.drain(limit) {
            delivered += self.fire(&event.name);
        }
        delivered
    }

    /// Delete every owned entry carrying the given tag.
    ///
    /// Only entries this pool owns are considered; records persisted by
    /// other processes stay untouched until they are loaded here.
    pub fn invalidate_tag(&mut self, tag: &str) -> usize {
        let mut deleted = 0;
        for entry in self.entries.values_mut() {
            if entry.has_tag([tag]) {
                entry.delete();
                deleted += 1;
            }
        }
        info!(tag, deleted, "Invalidated tagged cache entries");
        deleted
    }

    /// Flush every owned entry; `true` only if all write-backs succeeded.
    pub fn flush(&mut self) -> bool {
        let mut ok = true;
        for entry in self.entries.values_mut() {
            ok &= entry.sync_to_storage();
        }
        ok
    }
}
