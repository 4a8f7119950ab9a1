//! Named-event plumbing for deferred invalidation.
//!
//! Hosts publish application events (a post was saved, a menu changed) into
//! an in-memory queue; a pool later drains the queue and dispatches each
//! event name to the entries listening for it. Dispatch itself lives on the
//! entry; this module only carries the events.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;

use crate::lock::mutex_guard;

const SOURCE: &str = "scorta::events";

/// Monotonic ordering number for events within one process.
pub type Epoch = u64;

/// A named application event queued for cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    /// Host-defined event name, e.g. `"post.saved"`.
    pub name: String,
    /// Monotonic epoch assigned at publish time.
    pub epoch: Epoch,
    /// When the event was published.
    pub timestamp: OffsetDateTime,
}

/// In-memory FIFO queue of cache events.
///
/// Contention is expected to be low, so a plain mutex carries the queue.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish a named event.
    pub fn publish(&self, name: impl Into<String>) {
        let event = CacheEvent {
            name: name.into(),
            epoch: self.next_epoch(),
            timestamp: OffsetDateTime::now_utc(),
        };

        info!(
            event_name = %event.name,
            event_epoch = event.epoch,
            "Cache event enqueued"
        );

        mutex_guard(&self.queue, SOURCE, "publish").push_back(event);
    }

    /// Drain up to `limit` events, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_guard(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_guard(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all pending events.
    pub fn clear(&self) {
        mutex_guard(&self.queue, SOURCE, "clear").clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn epochs_are_monotonic() {
        let queue = EventQueue::new();

        queue.publish("a");
        queue.publish("b");
        queue.publish("c");

        let events = queue.drain(3);
        assert!(events[0].epoch < events[1].epoch);
        assert!(events[1].epoch < events[2].epoch);
    }

    #[test]
    fn drain_is_fifo_and_bounded() {
        let queue = EventQueue::new();

        queue.publish("post.saved");
        queue.publish("menu.changed");
        queue.publish("post.deleted");
        assert_eq!(queue.len(), 3);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "post.saved");
        assert_eq!(events[1].name, "menu.changed");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_more_than_available() {
        let queue = EventQueue::new();
        queue.publish("only");

        let events = queue.drain(100);
        assert_eq!(events.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_discards_pending_events() {
        let queue = EventQueue::new();
        queue.publish("a");
        queue.publish("b");

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish("still.works");
        assert_eq!(queue.len(), 1);
    }
}
