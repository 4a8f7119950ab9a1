//! Storage driver contract and the in-process reference driver.
//!
//! Entries read and write whole records through a keyed backend. The engine
//! assumes nothing about the backend beyond last-write-wins semantics and
//! that a written record is readable by a subsequent read in-process.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StorageError;
use crate::lock::{read_guard, write_guard};
use crate::record::StorageRecord;

const SOURCE: &str = "scorta::storage";

/// Keyed record backend a cache entry persists through.
///
/// Implementations decide how `(group, key)` maps onto their own namespace.
pub trait StorageDriver: Send + Sync {
    /// Read the record for `(group, key)`. `Ok(None)` is a miss, not an error.
    fn read(&self, group: &str, key: &str) -> Result<Option<StorageRecord>, StorageError>;

    /// Persist the record for `(group, key)`, replacing any previous one.
    fn write(&self, group: &str, key: &str, record: &StorageRecord) -> Result<(), StorageError>;

    /// Remove the record for `(group, key)`. Deleting an absent record is fine.
    fn delete(&self, group: &str, key: &str) -> Result<(), StorageError>;
}

/// Driver call counters, for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// In-memory reference driver.
///
/// Backs tests and single-process hosts; anything that outlives the process
/// needs a real backend behind the same trait.
#[derive(Default)]
pub struct MemoryDriver {
    records: RwLock<HashMap<(String, String), StorageRecord>>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> DriverStats {
        DriverStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        read_guard(&self.records, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageDriver for MemoryDriver {
    fn read(&self, group: &str, key: &str) -> Result<Option<StorageRecord>, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = read_guard(&self.records, SOURCE, "read");
        Ok(records.get(&(group.to_string(), key.to_string())).cloned())
    }

    fn write(&self, group: &str, key: &str, record: &StorageRecord) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut records = write_guard(&self.records, SOURCE, "write");
        records.insert((group.to_string(), key.to_string()), record.clone());
        Ok(())
    }

    fn delete(&self, group: &str, key: &str) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let mut records = write_guard(&self.records, SOURCE, "delete");
        records.remove(&(group.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Driver whose writes and deletes always fail; reads delegate to an
    /// inner `MemoryDriver` so resynchronization still sees real records.
    #[derive(Default)]
    pub(crate) struct FailingDriver {
        pub inner: MemoryDriver,
    }

    impl StorageDriver for FailingDriver {
        fn read(&self, group: &str, key: &str) -> Result<Option<StorageRecord>, StorageError> {
            self.inner.read(group, key)
        }

        fn write(&self, _: &str, _: &str, _: &StorageRecord) -> Result<(), StorageError> {
            Err(StorageError::backend("write refused"))
        }

        fn delete(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Err(StorageError::backend("delete refused"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use serde_json::json;

    use super::*;

    fn record(value: serde_json::Value) -> StorageRecord {
        StorageRecord {
            value: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn read_write_delete_round_trip() {
        let driver = MemoryDriver::new();

        assert!(driver.read("posts", "p1").expect("read").is_none());

        driver
            .write("posts", "p1", &record(json!("hello")))
            .expect("write");
        let stored = driver.read("posts", "p1").expect("read").expect("record");
        assert_eq!(stored.value, Some(json!("hello")));

        driver.delete("posts", "p1").expect("delete");
        assert!(driver.read("posts", "p1").expect("read").is_none());
    }

    #[test]
    fn groups_are_independent_namespaces() {
        let driver = MemoryDriver::new();

        driver.write("posts", "k", &record(json!(1))).expect("write");
        driver.write("pages", "k", &record(json!(2))).expect("write");

        let posts = driver.read("posts", "k").expect("read").expect("record");
        let pages = driver.read("pages", "k").expect("read").expect("record");
        assert_eq!(posts.value, Some(json!(1)));
        assert_eq!(pages.value, Some(json!(2)));
    }

    #[test]
    fn stats_count_driver_calls() {
        let driver = MemoryDriver::new();

        driver.write("g", "k", &record(json!(1))).expect("write");
        driver.write("g", "k", &record(json!(2))).expect("write");
        let _ = driver.read("g", "k");
        driver.delete("g", "k").expect("delete");

        let stats = driver.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.deletes, 1);
        assert!(driver.is_empty());
    }

    #[test]
    fn memory_driver_recovers_from_poisoned_lock() {
        let driver = MemoryDriver::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = driver
                .records
                .write()
                .expect("records lock should be acquired");
            panic!("poison records lock");
        }));

        driver.write("g", "k", &record(json!(1))).expect("write");
        assert_eq!(driver.len(), 1);
    }

    #[test]
    fn failing_driver_reads_through_to_inner_records() {
        let driver = testing::FailingDriver::default();
        driver
            .inner
            .write("g", "k", &record(json!("kept")))
            .expect("seed");

        assert!(driver.write("g", "k", &record(json!("new"))).is_err());
        let stored = driver.read("g", "k").expect("read").expect("record");
        assert_eq!(stored.value, Some(json!("kept")));
    }
}
