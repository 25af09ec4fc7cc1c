//! Typed entity store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, search and soft-delete APIs over one entity kind.
//! - Route every mutation through the shared save pipeline.
//!
//! # Invariants
//! - `create` forces `status = true` regardless of the caller's value.
//! - `delete` and `soft_delete` never remove rows.
//! - Read paths reject persisted rows whose `status`/`deleted_at` disagree.
//! - `find`/`exists` see inactive rows; only list operations filter.

use crate::audit::recorder::AuditRecorder;
use crate::context::CallContext;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{table_exists, table_has_column, DbError};
use crate::model::entity::{Entity, EntityId, EntityMeta, BASE_COLUMNS};
use crate::repo::active_filter::ActiveFilter;
use crate::repo::partial_update::{apply_patch, FieldError, FieldPatch};
use crate::unit_of_work::{self, TrackedEntry};
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::json;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from entity store operations.
///
/// Absent rows are not errors; see the `Option`/`bool` return values.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// A patched value does not fit its field.
    Field(FieldError),
    /// An entity could not be turned into a change-log snapshot.
    Snapshot(serde_json::Error),
    /// Persisted data cannot be converted to a valid entity.
    InvalidData(String),
    /// The call was cancelled before commit; nothing was written.
    Cancelled,
    /// A row loaded by this call disappeared before it was written.
    RowVanished { table: &'static str, id: EntityId },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Field(err) => write!(f, "{err}"),
            Self::Snapshot(err) => write!(f, "failed to capture change snapshot: {err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted entity data: {message}")
            }
            Self::Cancelled => write!(f, "operation cancelled before commit"),
            Self::RowVanished { table, id } => {
                write!(f, "row {id} in `{table}` disappeared during save")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Field(err) => Some(err),
            Self::Snapshot(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<FieldError> for StoreError {
    fn from(value: FieldError) -> Self {
        Self::Field(value)
    }
}

/// Query options for listing entities.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub include_inactive: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Boolean predicate over an entity's fields.
pub type Predicate<'a, T> = &'a dyn Fn(&T) -> bool;

/// Typed CRUD contract over one entity kind.
pub trait EntityStore<T: Entity> {
    /// Lists rows under `query`, ordered by `id ASC`.
    fn list(&self, query: &ListQuery) -> StoreResult<Vec<T>>;
    fn get_by_id(&self, id: EntityId) -> StoreResult<Option<T>>;
    /// Persists a new row and returns it with its assigned id.
    fn create(&self, ctx: &CallContext, entity: T) -> StoreResult<T>;
    /// Replaces all writable fields of the row `entity.id()`.
    fn update(&self, ctx: &CallContext, entity: &T) -> StoreResult<Option<T>>;
    /// Applies a sparse field map onto the row `id`.
    fn update_partial(
        &self,
        ctx: &CallContext,
        id: EntityId,
        patch: &FieldPatch,
    ) -> StoreResult<Option<T>>;
    /// Hard delete request; resolved to a soft delete at save time.
    fn delete(&self, ctx: &CallContext, id: EntityId) -> StoreResult<bool>;
    /// Explicit soft delete. Repeating it on an inactive row still succeeds.
    fn soft_delete(&self, ctx: &CallContext, id: EntityId) -> StoreResult<bool>;
    /// Rows matching `predicate`, inactive rows included.
    fn find(&self, predicate: Predicate<'_, T>) -> StoreResult<Vec<T>>;
    fn exists(&self, predicate: Predicate<'_, T>) -> StoreResult<bool>;
    fn count_active(&self) -> StoreResult<u64>;

    /// Active rows only.
    fn get_all(&self) -> StoreResult<Vec<T>> {
        self.list(&ListQuery::default())
    }

    fn get_all_with_inactive(&self) -> StoreResult<Vec<T>> {
        self.list(&ListQuery {
            include_inactive: true,
            ..ListQuery::default()
        })
    }

    /// Re-activates a row through a plain `status = true` update.
    fn restore(&self, ctx: &CallContext, id: EntityId) -> StoreResult<Option<T>> {
        let patch = FieldPatch::from([("status".to_string(), json!(true))]);
        self.update_partial(ctx, id, &patch)
    }
}

/// SQLite-backed entity store.
pub struct SqliteEntityStore<'conn, T> {
    conn: &'conn Connection,
    audit: &'conn AuditRecorder,
    _entity: PhantomData<fn() -> T>,
}

impl<'conn, T: Entity> SqliteEntityStore<'conn, T> {
    /// Constructs a store from a migrated connection and a running recorder.
    pub fn try_new(conn: &'conn Connection, audit: &'conn AuditRecorder) -> StoreResult<Self> {
        ensure_entity_table_ready::<T>(conn)?;
        Ok(Self {
            conn,
            audit,
            _entity: PhantomData,
        })
    }

    fn save_one(&self, ctx: &CallContext, entry: TrackedEntry<T>) -> StoreResult<T> {
        unit_of_work::save(self.conn, self.audit, ctx, vec![entry])?
            .pop()
            .ok_or_else(|| StoreError::InvalidData("save returned no entity".to_string()))
    }

    /// Logs a failed store call at `error` level and hands the result back.
    fn logged<R>(&self, event: &str, result: StoreResult<R>) -> StoreResult<R> {
        if let Err(err) = &result {
            error!(
                "event={event} module=store status=error table={} error_code={event}_failed error={}",
                T::TABLE,
                err
            );
        }
        result
    }

    fn load(&self, id: EntityId) -> StoreResult<Option<T>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1;", select_sql::<T>()))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entity_row(row)?));
        }

        Ok(None)
    }

    fn query_rows(&self, query: &ListQuery) -> StoreResult<Vec<T>> {
        let filter = ActiveFilter::from_include_inactive(query.include_inactive);
        let mut sql = format!("{} WHERE 1 = 1", select_sql::<T>());
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(predicate) = filter.sql_predicate() {
            sql.push_str(" AND ");
            sql.push_str(predicate);
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entities = Vec::new();

        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }

        Ok(entities)
    }

    fn count_active_rows(&self) -> StoreResult<u64> {
        let predicate = ActiveFilter::ActiveOnly
            .sql_predicate()
            .map_or_else(String::new, |predicate| format!(" WHERE {predicate}"));
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{predicate};", T::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Streams rows under `filter` in `id` order until `visit` returns `false`.
    fn scan<F>(&self, filter: ActiveFilter, mut visit: F) -> StoreResult<()>
    where
        F: FnMut(T) -> bool,
    {
        let mut sql = select_sql::<T>();
        if let Some(predicate) = filter.sql_predicate() {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        sql.push_str(" ORDER BY id ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if !visit(parse_entity_row(row)?) {
                break;
            }
        }
        Ok(())
    }
}

impl<T: Entity> EntityStore<T> for SqliteEntityStore<'_, T> {
    fn list(&self, query: &ListQuery) -> StoreResult<Vec<T>> {
        self.logged("entity_read", self.query_rows(query))
    }

    fn get_by_id(&self, id: EntityId) -> StoreResult<Option<T>> {
        self.logged("entity_read", self.load(id))
    }

    fn create(&self, ctx: &CallContext, entity: T) -> StoreResult<T> {
        self.save_one(ctx, TrackedEntry::added(entity))
    }

    fn update(&self, ctx: &CallContext, entity: &T) -> StoreResult<Option<T>> {
        let Some(original) = self.logged("entity_update", self.load(entity.id()))? else {
            debug!(
                "event=entity_update module=store status=not_found table={} id={}",
                T::TABLE,
                entity.id()
            );
            return Ok(None);
        };

        let mut current = entity.clone();
        {
            let stored = original.meta();
            let meta = current.meta_mut();
            meta.id = stored.id;
            meta.created_at = stored.created_at;
            meta.updated_at = stored.updated_at;
            meta.deleted_at = stored.deleted_at;
        }

        self.save_one(ctx, TrackedEntry::modified(original, current)).map(Some)
    }

    fn update_partial(
        &self,
        ctx: &CallContext,
        id: EntityId,
        patch: &FieldPatch,
    ) -> StoreResult<Option<T>> {
        let Some(original) = self.logged("entity_patch", self.load(id))? else {
            debug!(
                "event=entity_patch module=store status=not_found table={} id={id}",
                T::TABLE
            );
            return Ok(None);
        };

        let mut current = original.clone();
        let outcome = apply_patch(&mut current, patch)?;
        if !outcome.skipped.is_empty() {
            debug!(
                "event=entity_patch module=store status=partial table={} id={id} skipped={}",
                T::TABLE,
                outcome.skipped.join(",")
            );
        }

        self.save_one(ctx, TrackedEntry::modified(original, current)).map(Some)
    }

    fn delete(&self, ctx: &CallContext, id: EntityId) -> StoreResult<bool> {
        let Some(original) = self.logged("entity_delete", self.load(id))? else {
            return Ok(false);
        };

        self.save_one(ctx, TrackedEntry::pending_delete(original))?;
        Ok(true)
    }

    fn soft_delete(&self, ctx: &CallContext, id: EntityId) -> StoreResult<bool> {
        let Some(original) = self.logged("entity_soft_delete", self.load(id))? else {
            return Ok(false);
        };

        self.save_one(ctx, TrackedEntry::soft_deleted(original))?;
        Ok(true)
    }

    fn find(&self, predicate: Predicate<'_, T>) -> StoreResult<Vec<T>> {
        let mut matches = Vec::new();
        let scanned = self.scan(ActiveFilter::IncludeInactive, |entity| {
            if predicate(&entity) {
                matches.push(entity);
            }
            true
        });
        self.logged("entity_read", scanned)?;
        Ok(matches)
    }

    fn exists(&self, predicate: Predicate<'_, T>) -> StoreResult<bool> {
        let mut found = false;
        let scanned = self.scan(ActiveFilter::IncludeInactive, |entity| {
            found = predicate(&entity);
            !found
        });
        self.logged("entity_read", scanned)?;
        Ok(found)
    }

    fn count_active(&self) -> StoreResult<u64> {
        self.logged("entity_read", self.count_active_rows())
    }
}

fn select_sql<T: Entity>() -> String {
    let columns = BASE_COLUMNS
        .iter()
        .chain(T::COLUMNS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {columns} FROM {}", T::TABLE)
}

fn parse_entity_row<T: Entity>(row: &Row<'_>) -> StoreResult<T> {
    let status = match row.get::<_, i64>("status")? {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid status value `{other}` in {}.status",
                T::TABLE
            )));
        }
    };

    let meta = EntityMeta {
        id: row.get("id")?,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    if !meta.lifecycle_is_consistent() {
        return Err(StoreError::InvalidData(format!(
            "row {} in {} has status={} but deleted_at={:?}",
            meta.id,
            T::TABLE,
            meta.status,
            meta.deleted_at
        )));
    }

    Ok(T::from_row(meta, row)?)
}

fn ensure_entity_table_ready<T: Entity>(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, T::TABLE)? {
        return Err(StoreError::MissingRequiredTable(T::TABLE));
    }

    for column in BASE_COLUMNS.iter().chain(T::COLUMNS.iter()).copied() {
        if !table_has_column(conn, T::TABLE, column)? {
            return Err(StoreError::MissingRequiredColumn {
                table: T::TABLE,
                column,
            });
        }
    }

    Ok(())
}
