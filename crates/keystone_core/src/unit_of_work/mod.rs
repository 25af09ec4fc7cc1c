//! Tracked entries and the save pipeline shared by every entity kind.
//!
//! # Responsibility
//! - Track per-entry state (`Added`, `Modified`, `PendingHardDelete`).
//! - Run one save: tombstone rewrite, snapshot capture, transactional
//!   write, commit, change-log enqueue.
//!
//! # Invariants
//! - No row is ever removed; deletions reach SQLite as `UPDATE`s.
//! - Snapshots are captured before the transaction commits.
//! - Cancellation is honored until right before commit and never after.
//! - The change-log enqueue runs only after a successful commit.

pub mod soft_delete;

use crate::audit::collector::{self, ChangeSnapshot};
use crate::audit::record::AuditAction;
use crate::audit::recorder::AuditRecorder;
use crate::context::CallContext;
use crate::model::entity::Entity;
use crate::repo::entity_store::{StoreError, StoreResult};
use log::{error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Tracking state of one entity at save time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unchanged,
    Added,
    Modified,
    PendingHardDelete,
}

/// One entity tracked by a unit of work.
#[derive(Debug, Clone)]
pub struct TrackedEntry<T> {
    state: EntryState,
    original: Option<T>,
    current: T,
    deletion: bool,
}

impl<T: Entity> TrackedEntry<T> {
    pub fn added(entity: T) -> Self {
        Self {
            state: EntryState::Added,
            original: None,
            current: entity,
            deletion: false,
        }
    }

    pub fn modified(original: T, current: T) -> Self {
        Self {
            state: EntryState::Modified,
            original: Some(original),
            current,
            deletion: false,
        }
    }

    /// Explicit soft delete: an update that flips `status` off.
    pub fn soft_deleted(original: T) -> Self {
        let mut current = original.clone();
        current.meta_mut().status = false;
        Self {
            state: EntryState::Modified,
            original: Some(original),
            current,
            deletion: true,
        }
    }

    /// Hard delete request; rewritten by `soft_delete` before writing.
    pub fn pending_delete(original: T) -> Self {
        Self {
            state: EntryState::PendingHardDelete,
            current: original.clone(),
            original: Some(original),
            deletion: false,
        }
    }

    pub fn unchanged(entity: T) -> Self {
        Self {
            state: EntryState::Unchanged,
            original: Some(entity.clone()),
            current: entity,
            deletion: false,
        }
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn original(&self) -> Option<&T> {
        self.original.as_ref()
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn into_current(self) -> T {
        self.current
    }

    /// Whether this entry resolves to a soft delete.
    pub fn is_deletion(&self) -> bool {
        self.deletion || self.state == EntryState::PendingHardDelete
    }

    /// Change-log action for this entry, `None` when nothing is written.
    pub fn audit_action(&self) -> Option<AuditAction> {
        match self.state {
            EntryState::Unchanged => None,
            EntryState::Added => Some(AuditAction::Create),
            EntryState::Modified | EntryState::PendingHardDelete if self.is_deletion() => {
                Some(AuditAction::Delete)
            }
            EntryState::Modified | EntryState::PendingHardDelete => Some(AuditAction::Update),
        }
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Runs the save pipeline for `entries` and returns the written entities.
pub fn save<T: Entity>(
    conn: &Connection,
    recorder: &AuditRecorder,
    ctx: &CallContext,
    mut entries: Vec<TrackedEntry<T>>,
) -> StoreResult<Vec<T>> {
    let started_at = Instant::now();
    ensure_not_cancelled(ctx, T::TABLE, "before_write")?;

    let now = now_epoch_ms();
    soft_delete::rewrite_pending_deletions(&mut entries, now);
    stamp_entries(&mut entries, now);

    let mut snapshots = collector::collect(&entries).map_err(StoreError::Snapshot)?;

    if let Err(err) = write_entries(conn, ctx, &mut entries, &mut snapshots) {
        error!(
            "event=entity_save module=store status=error table={} actor={} duration_ms={} error={}",
            T::TABLE,
            ctx.actor_name(),
            started_at.elapsed().as_millis(),
            err
        );
        return Err(err);
    }

    info!(
        "event=entity_save module=store status=ok table={} actor={} entries={} duration_ms={}",
        T::TABLE,
        ctx.actor_name(),
        snapshots.len(),
        started_at.elapsed().as_millis()
    );

    recorder.record(ctx.actor_name(), snapshots, now);

    Ok(entries.into_iter().map(TrackedEntry::into_current).collect())
}

fn ensure_not_cancelled(ctx: &CallContext, table: &str, stage: &str) -> StoreResult<()> {
    if ctx.is_cancelled() {
        info!(
            "event=entity_save module=store status=cancelled table={table} stage={stage} actor={}",
            ctx.actor_name()
        );
        return Err(StoreError::Cancelled);
    }
    Ok(())
}

fn stamp_entries<T: Entity>(entries: &mut [TrackedEntry<T>], now: i64) {
    for entry in entries.iter_mut() {
        let meta = entry.current.meta_mut();
        match entry.state {
            EntryState::Added => {
                meta.id = 0;
                meta.status = true;
                meta.created_at = now;
                meta.updated_at = None;
                meta.deleted_at = None;
            }
            EntryState::Modified if entry.deletion => {
                meta.mark_deleted(now);
                meta.updated_at = Some(now);
            }
            EntryState::Modified => {
                soft_delete::enforce_tombstone_invariant(meta, now);
                meta.updated_at = Some(now);
            }
            EntryState::Unchanged | EntryState::PendingHardDelete => {}
        }
    }
}

fn write_entries<T: Entity>(
    conn: &Connection,
    ctx: &CallContext,
    entries: &mut [TrackedEntry<T>],
    snapshots: &mut [ChangeSnapshot],
) -> StoreResult<()> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut snapshot_index = 0;

    for entry in entries.iter_mut() {
        match entry.state {
            EntryState::Added => {
                let id = insert_row(&tx, &entry.current)?;
                entry.current.meta_mut().id = id;
                if let Some(snapshot) = snapshots.get_mut(snapshot_index) {
                    snapshot.resolve_entity_id(id);
                }
            }
            EntryState::Modified => update_row(&tx, &entry.current)?,
            EntryState::Unchanged | EntryState::PendingHardDelete => continue,
        }
        snapshot_index += 1;
    }

    // Dropping `tx` on this early return rolls the transaction back.
    ensure_not_cancelled(ctx, T::TABLE, "before_commit")?;
    tx.commit()?;
    Ok(())
}

fn insert_row<T: Entity>(tx: &Transaction<'_>, entity: &T) -> StoreResult<i64> {
    let meta = entity.meta();
    let columns = T::COLUMNS.join(", ");
    let placeholders = (1..=T::COLUMNS.len() + 4)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} (status, created_at, updated_at, deleted_at, {columns}) VALUES ({placeholders});",
        T::TABLE
    );

    let mut values = vec![
        Value::Integer(bool_to_int(meta.status)),
        Value::Integer(meta.created_at),
        meta.updated_at.map_or(Value::Null, Value::Integer),
        meta.deleted_at.map_or(Value::Null, Value::Integer),
    ];
    values.extend(entity.column_values());

    tx.execute(&sql, params_from_iter(values))?;
    Ok(tx.last_insert_rowid())
}

fn update_row<T: Entity>(tx: &Transaction<'_>, entity: &T) -> StoreResult<()> {
    let meta = entity.meta();
    let assignments = T::COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| format!("{column} = ?{}", index + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let id_placeholder = T::COLUMNS.len() + 4;
    let sql = format!(
        "UPDATE {}
         SET status = ?1, updated_at = ?2, deleted_at = ?3, {assignments}
         WHERE id = ?{id_placeholder};",
        T::TABLE
    );

    let mut values = vec![
        Value::Integer(bool_to_int(meta.status)),
        meta.updated_at.map_or(Value::Null, Value::Integer),
        meta.deleted_at.map_or(Value::Null, Value::Integer),
    ];
    values.extend(entity.column_values());
    values.push(Value::Integer(meta.id));

    let changed = tx.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(StoreError::RowVanished {
            table: T::TABLE,
            id: meta.id,
        });
    }
    Ok(())
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
