//! Lock acquisition that survives poisoning.
//!
//! A panic while a cache lock is held must not wedge every later cache
//! access, so guards are recovered from poisoning and the incident logged.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn note_recovery(kind: &'static str, target: &'static str, op: &'static str) {
    warn!(
        op,
        target_module = target,
        lock_kind = kind,
        hint = "state may be stale after panic in another thread",
        "Recovered from poisoned cache lock"
    );
}

pub(crate) fn read_guard<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        note_recovery("rwlock.read", target, op);
        poisoned.into_inner()
    })
}

pub(crate) fn write_guard<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        note_recovery("rwlock.write", target, op);
        poisoned.into_inner()
    })
}

pub(crate) fn mutex_guard<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        note_recovery("mutex.lock", target, op);
        poisoned.into_inner()
    })
}
