//! Base entity shape and the storage contract every kind implements.
//!
//! # Responsibility
//! - Carry identity and lifecycle columns (`status`, timestamps).
//! - Describe how a kind maps onto its table (name, columns, row codec).
//! - Expose the kind's field descriptor table for partial updates.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - `created_at` is set once at creation.
//! - `deleted_at.is_some()` exactly when `status == false`.

use crate::repo::partial_update::FieldTable;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the store on creation.
pub type EntityId = i64;

/// Columns shared by every entity table, in select order.
pub const BASE_COLUMNS: &[&str] = &["id", "status", "created_at", "updated_at", "deleted_at"];

/// Identity and lifecycle fields embedded in every stored kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// `0` until the store assigns the row id.
    pub id: EntityId,
    /// `false` means logically deleted.
    pub status: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last mutation after creation.
    pub updated_at: Option<i64>,
    /// Unix epoch milliseconds. Set exactly while `status == false`.
    pub deleted_at: Option<i64>,
}

impl Default for EntityMeta {
    fn default() -> Self {
        Self {
            id: 0,
            status: true,
            created_at: 0,
            updated_at: None,
            deleted_at: None,
        }
    }
}

impl EntityMeta {
    /// Returns whether the row counts as an active row.
    pub fn is_active(&self) -> bool {
        self.status
    }

    /// Flips the row into the tombstone state at `now`.
    pub fn mark_deleted(&mut self, now: i64) {
        self.status = false;
        self.deleted_at = Some(now);
    }

    /// Returns whether `status` and `deleted_at` agree with each other.
    pub fn lifecycle_is_consistent(&self) -> bool {
        self.status == self.deleted_at.is_none()
    }
}

/// Storage contract for one entity kind.
///
/// Implementations are plain data mapping: the generic store owns every SQL
/// statement and the whole save pipeline.
pub trait Entity: Clone + Serialize + Sized + 'static {
    /// Table holding rows of this kind.
    const TABLE: &'static str;
    /// Kind-specific columns, excluding `BASE_COLUMNS`.
    const COLUMNS: &'static [&'static str];

    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Values for `COLUMNS`, in the same order.
    fn column_values(&self) -> Vec<Value>;

    /// Decodes kind-specific columns from a row selected by the store.
    fn from_row(meta: EntityMeta, row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Name-to-setter table consulted by partial updates.
    fn field_table() -> &'static FieldTable<Self>;

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn is_active(&self) -> bool {
        self.meta().is_active()
    }

    /// Full field map used for change-log snapshots.
    fn snapshot(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub(crate) fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

pub(crate) fn optional_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

#[cfg(test)]
mod tests {
    use super::EntityMeta;

    #[test]
    fn default_meta_is_active_and_consistent() {
        let meta = EntityMeta::default();
        assert!(meta.is_active());
        assert!(meta.lifecycle_is_consistent());
    }

    #[test]
    fn mark_deleted_sets_tombstone_fields() {
        let mut meta = EntityMeta::default();
        meta.mark_deleted(42);
        assert!(!meta.status);
        assert_eq!(meta.deleted_at, Some(42));
        assert!(meta.lifecycle_is_consistent());
    }

    #[test]
    fn status_without_deleted_at_is_inconsistent() {
        let meta = EntityMeta {
            status: false,
            ..EntityMeta::default()
        };
        assert!(!meta.lifecycle_is_consistent());
    }
}
