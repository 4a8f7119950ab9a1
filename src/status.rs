//! Dirty-state tracking for cache entries.
//!
//! The status decides what a write-back has to do: nothing, a metadata-only
//! refresh, a full value write, or a storage delete.

/// How an entry's in-memory state relates to persisted storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyStatus {
    /// In-memory state matches storage.
    #[default]
    Clean,
    /// The value changed; a full write-back is required.
    Dirty,
    /// Only metadata (TTL, expiry, tags) changed; write-back preserves
    /// `last_save`.
    DirtyShallow,
    /// The value was explicitly removed; write-back deletes the record.
    Deleted,
}

impl DirtyStatus {
    pub fn is_clean(self) -> bool {
        matches!(self, DirtyStatus::Clean)
    }

    /// Record a metadata-only change.
    ///
    /// A clean entry becomes `DirtyShallow`; anything already pending a full
    /// write or a delete keeps its status, since those writes carry the
    /// metadata anyway.
    pub(crate) fn mark_meta_dirty(&mut self) {
        if matches!(self, DirtyStatus::Clean) {
            *self = DirtyStatus::DirtyShallow;
        }
    }
}
