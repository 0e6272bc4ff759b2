//! Sync metadata embedded in every replicated entity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EntityId;
use crate::util::now_millis;

/// Replication bookkeeping carried by every synced row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Client-generated identifier
    pub id: EntityId,
    /// Last mutation timestamp (Unix ms); the only conflict-resolution signal
    pub last_modified: i64,
    /// True only right after a write confirmed by the remote store
    pub is_synced: bool,
    /// Opaque token regenerated on every local mutation (diagnostics only)
    pub sync_version: Option<String>,
    /// Tombstone flag; rows are never physically removed
    pub is_deleted: bool,
}

impl Envelope {
    /// Envelope for a brand-new entity
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: EntityId::new(),
            last_modified: now_millis(),
            is_synced: false,
            sync_version: None,
            is_deleted: false,
        }
    }

    /// Record a local mutation.
    ///
    /// `last_modified` never moves backwards, even if the wall clock does.
    pub fn stamp(&mut self) {
        self.last_modified = now_millis().max(self.last_modified);
        self.is_synced = false;
        self.sync_version = Some(Uuid::new_v4().to_string());
    }

    /// Whether `other` should win a last-writer-wins comparison against `self`.
    #[must_use]
    pub const fn is_older_than(&self, other: &Self) -> bool {
        other.last_modified > self.last_modified
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_is_unsynced_and_live() {
        let envelope = Envelope::new();
        assert!(!envelope.is_synced);
        assert!(!envelope.is_deleted);
        assert!(envelope.last_modified > 0);
    }

    #[test]
    fn stamp_resets_sync_flag_and_regenerates_version() {
        let mut envelope = Envelope::new();
        envelope.is_synced = true;
        envelope.stamp();
        let first_version = envelope.sync_version.clone();
        assert!(!envelope.is_synced);
        assert!(first_version.is_some());

        envelope.stamp();
        assert_ne!(envelope.sync_version, first_version);
    }

    #[test]
    fn stamp_never_moves_timestamp_backwards() {
        let mut envelope = Envelope::new();
        let future = now_millis() + 60_000;
        envelope.last_modified = future;
        envelope.stamp();
        assert_eq!(envelope.last_modified, future);
    }

    #[test]
    fn is_older_than_is_strict() {
        let mut a = Envelope::new();
        let mut b = a.clone();
        a.last_modified = 100;
        b.last_modified = 100;
        assert!(!a.is_older_than(&b));
        b.last_modified = 101;
        assert!(a.is_older_than(&b));
        assert!(!b.is_older_than(&a));
    }
}
