//! Save-time rewrite of deletion requests into tombstone updates.
//!
//! # Invariants
//! - After `rewrite_pending_deletions`, no entry is `PendingHardDelete`.
//! - A rewritten entry is `Modified` with `status = false` and
//!   `deleted_at = now`; the rewrite is unconditional, so repeating a delete
//!   refreshes `deleted_at`.
//! - There is no transition back to `Added`; re-activation is a plain
//!   `status = true` update.

use super::{EntryState, TrackedEntry};
use crate::model::entity::{Entity, EntityMeta};

/// Rewrites every `PendingHardDelete` entry into a soft-delete update.
///
/// Returns the number of rewritten entries.
pub fn rewrite_pending_deletions<T: Entity>(entries: &mut [TrackedEntry<T>], now: i64) -> usize {
    let mut rewritten = 0;
    for entry in entries
        .iter_mut()
        .filter(|entry| entry.state == EntryState::PendingHardDelete)
    {
        entry.current.meta_mut().mark_deleted(now);
        entry.state = EntryState::Modified;
        entry.deletion = true;
        rewritten += 1;
    }
    rewritten
}

/// Keeps `deleted_at` in step with `status` for plain updates.
///
/// An existing tombstone timestamp is preserved while the row stays inactive.
pub fn enforce_tombstone_invariant(meta: &mut EntityMeta, now: i64) {
    if meta.status {
        meta.deleted_at = None;
    } else if meta.deleted_at.is_none() {
        meta.deleted_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::{enforce_tombstone_invariant, rewrite_pending_deletions};
    use crate::model::entity::EntityMeta;
    use crate::model::role::Role;
    use crate::unit_of_work::{EntryState, TrackedEntry};

    fn stored_role(id: i64) -> Role {
        let mut role = Role::new("auditor", None);
        role.meta.id = id;
        role.meta.created_at = 100;
        role
    }

    #[test]
    fn pending_delete_becomes_modified_tombstone() {
        let mut entries = vec![
            TrackedEntry::pending_delete(stored_role(1)),
            TrackedEntry::unchanged(stored_role(2)),
        ];

        assert_eq!(rewrite_pending_deletions(&mut entries, 500), 1);
        assert_eq!(entries[0].state(), EntryState::Modified);
        assert!(entries[0].is_deletion());
        assert!(!entries[0].current().meta.status);
        assert_eq!(entries[0].current().meta.deleted_at, Some(500));
        assert_eq!(entries[1].state(), EntryState::Unchanged);
    }

    #[test]
    fn repeated_rewrite_refreshes_timestamp_and_keeps_status() {
        let mut deleted = stored_role(1);
        deleted.meta.mark_deleted(200);
        let mut entries = vec![TrackedEntry::pending_delete(deleted)];

        rewrite_pending_deletions(&mut entries, 900);
        assert!(!entries[0].current().meta.status);
        assert_eq!(entries[0].current().meta.deleted_at, Some(900));
    }

    #[test]
    fn invariant_follows_status() {
        let mut meta = EntityMeta {
            status: false,
            ..EntityMeta::default()
        };
        enforce_tombstone_invariant(&mut meta, 10);
        assert_eq!(meta.deleted_at, Some(10));

        enforce_tombstone_invariant(&mut meta, 20);
        assert_eq!(meta.deleted_at, Some(10));

        meta.status = true;
        enforce_tombstone_invariant(&mut meta, 30);
        assert_eq!(meta.deleted_at, None);
    }
}
