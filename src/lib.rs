//! Scorta: per-key write-back cache entries for content-management backends.
//!
//! Each cache entry owns one `(group, key)` slot in a pluggable key/value
//! storage driver. Entries load lazily, track how their in-memory state
//! diverges from storage, and write back on demand or when dropped.
//! Expiration combines a relative TTL with an optional fixed expiry
//! instant; tags group entries for bulk invalidation; named events let
//! host code bind invalidation to application activity.
//!
//! Two entry flavors exist: [`Entry`] carries only TTL semantics, while
//! [`TaggedEntry`] adds tags, the fixed expiry date, and event
//! subscriptions. [`CachePool`] owns a family of tagged entries and fans
//! application events out to them.
//!
//! ```
//! use std::sync::Arc;
//! use scorta::{Entry, MemoryDriver};
//!
//! let driver = Arc::new(MemoryDriver::new());
//! let mut entry = Entry::new(driver, "posts", "p1");
//! assert!(entry.value().is_none());
//!
//! entry.set("rendered post");
//! assert!(entry.sync_to_storage());
//! assert!(entry.is_hit());
//! ```

mod config;
mod entry;
mod error;
mod events;
mod expiry;
mod lock;
mod pool;
mod record;
mod status;
mod storage;
mod tagged;

pub use config::CacheConfig;
pub use entry::Entry;
pub use error::StorageError;
pub use events::{CacheEvent, Epoch, EventQueue};
pub use pool::CachePool;
pub use record::StorageRecord;
pub use status::DirtyStatus;
pub use storage::{DriverStats, MemoryDriver, StorageDriver};
pub use tagged::TaggedEntry;
