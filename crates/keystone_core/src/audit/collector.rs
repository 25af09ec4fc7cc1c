//! Before/after capture of tracked entries, run ahead of the physical write.
//!
//! # Invariants
//! - `before` is `None` only for creates; `after` is `None` only for deletes.
//! - `Unchanged` entries produce no snapshot.
//! - Snapshots of creates carry `entity_id == 0` until the store resolves
//!   the assigned row id.

use crate::audit::record::{AuditAction, NewChangeLogEntry};
use crate::model::entity::{Entity, EntityId};
use crate::unit_of_work::{EntryState, TrackedEntry};
use serde_json::Value;

/// Captured field values of one mutated entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSnapshot {
    pub action: AuditAction,
    pub table_name: &'static str,
    pub entity_id: EntityId,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl ChangeSnapshot {
    /// Fills in the row id assigned during insert.
    pub fn resolve_entity_id(&mut self, id: EntityId) {
        self.entity_id = id;
        if let Some(Value::Object(fields)) = self.after.as_mut() {
            fields.insert("id".to_string(), Value::from(id));
        }
    }

    /// Serializes the snapshot into a change-log row.
    pub fn into_entry(self, actor: &str, created_at: i64) -> NewChangeLogEntry {
        NewChangeLogEntry {
            table_name: self.table_name.to_string(),
            entity_id: self.entity_id,
            action: self.action,
            old_values: self.before.map(|value| value.to_string()),
            new_values: self.after.map(|value| value.to_string()),
            actor: actor.to_string(),
            created_at,
        }
    }
}

/// Captures one snapshot per mutated entry, in entry order.
pub fn collect<T: Entity>(
    entries: &[TrackedEntry<T>],
) -> serde_json::Result<Vec<ChangeSnapshot>> {
    let mut snapshots = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(action) = entry.audit_action() else {
            continue;
        };

        let before = match (entry.state(), entry.original()) {
            (EntryState::Added, _) | (_, None) => None,
            (_, Some(original)) => Some(original.snapshot()?),
        };
        let after = match action {
            AuditAction::Delete => None,
            AuditAction::Create | AuditAction::Update => Some(entry.current().snapshot()?),
        };

        snapshots.push(ChangeSnapshot {
            action,
            table_name: T::TABLE,
            entity_id: entry.current().id(),
            before,
            after,
        });
    }

    Ok(snapshots)
}
