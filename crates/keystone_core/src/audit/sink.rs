//! Append-only change-log sinks.
//!
//! # Responsibility
//! - Define the outbound contract the recorder writes through.
//! - Persist change-log rows into their own SQLite database.
//! - Offer read access to the change log for callers and tests.
//!
//! # Invariants
//! - Sinks only insert; rows are never updated or deleted.
//! - The SQLite sink never shares a connection or transaction with the
//!   entity store.

use crate::audit::record::{
    AuditAction, AuditError, AuditResult, ChangeLogRecord, NewChangeLogEntry,
};
use crate::db::migrations::{current_user_version, latest_audit_version};
use crate::db::{table_exists, DbError};
use crate::model::entity::EntityId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const CHANGE_LOG_TABLE: &str = "change_log";

const CHANGE_LOG_SELECT_SQL: &str = "SELECT
    id,
    table_name,
    entity_id,
    action,
    old_values,
    new_values,
    actor,
    created_at
FROM change_log";

/// Destination for change-log rows.
pub trait AuditSink: Send {
    /// Appends one row and returns its assigned id.
    fn append(&self, entry: &NewChangeLogEntry) -> AuditResult<i64>;
}

/// Filter options for reading the change log.
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub table_name: Option<String>,
    pub entity_id: Option<EntityId>,
    pub action: Option<AuditAction>,
    pub limit: Option<u32>,
}

impl AuditLogQuery {
    pub fn for_entity(table_name: &str, entity_id: EntityId) -> Self {
        Self {
            table_name: Some(table_name.to_string()),
            entity_id: Some(entity_id),
            ..Self::default()
        }
    }
}

/// SQLite-backed sink owning a dedicated change-log connection.
///
/// Cloning shares the same connection, so one clone can feed the recorder
/// while another serves reads.
#[derive(Clone)]
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    /// Wraps a connection opened by `open_audit_db*`.
    pub fn try_new(conn: Connection) -> AuditResult<Self> {
        let expected_version = latest_audit_version();
        let actual_version = current_user_version(&conn)?;
        if actual_version != expected_version {
            return Err(AuditError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        if !table_exists(&conn, CHANGE_LOG_TABLE)? {
            return Err(AuditError::MissingRequiredTable(CHANGE_LOG_TABLE));
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Reads change-log rows ordered by `id ASC`.
    pub fn list(&self, query: &AuditLogQuery) -> AuditResult<Vec<ChangeLogRecord>> {
        let mut sql = format!("{CHANGE_LOG_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(table_name) = query.table_name.as_deref() {
            sql.push_str(" AND table_name = ?");
            bind_values.push(Value::Text(table_name.to_string()));
        }
        if let Some(entity_id) = query.entity_id {
            sql.push_str(" AND entity_id = ?");
            bind_values.push(Value::Integer(entity_id));
        }
        if let Some(action) = query.action {
            sql.push_str(" AND action = ?");
            bind_values.push(Value::Text(action.as_str().to_string()));
        }

        sql.push_str(" ORDER BY id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            records.push(parse_change_log_row(row)?);
        }

        Ok(records)
    }

    /// Returns the number of change-log rows.
    pub fn count(&self) -> AuditResult<u64> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM change_log;", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another writer panicked mid-call; the
        // connection itself stays usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AuditSink for SqliteAuditSink {
    fn append(&self, entry: &NewChangeLogEntry) -> AuditResult<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO change_log (
                table_name,
                entity_id,
                action,
                old_values,
                new_values,
                actor,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                entry.table_name.as_str(),
                entry.entity_id,
                entry.action.as_str(),
                entry.old_values.as_deref(),
                entry.new_values.as_deref(),
                entry.actor.as_str(),
                entry.created_at,
            ],
        )
        .map_err(|err| AuditError::Db(DbError::Sqlite(err)))?;

        Ok(conn.last_insert_rowid())
    }
}

fn parse_change_log_row(row: &Row<'_>) -> AuditResult<ChangeLogRecord> {
    let action_text: String = row.get("action")?;
    let action = AuditAction::parse(&action_text).ok_or_else(|| {
        AuditError::InvalidData(format!(
            "invalid action `{action_text}` in change_log.action"
        ))
    })?;

    Ok(ChangeLogRecord {
        id: row.get("id")?,
        table_name: row.get("table_name")?,
        entity_id: row.get("entity_id")?,
        action,
        old_values: row.get("old_values")?,
        new_values: row.get("new_values")?,
        actor: row.get("actor")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{AuditLogQuery, AuditSink, SqliteAuditSink};
    use crate::audit::record::{AuditAction, AuditError, NewChangeLogEntry};
    use crate::db::migrations::{latest_audit_version, latest_version};
    use crate::db::{open_audit_db_in_memory, open_db_in_memory};
    use rusqlite::Connection;

    fn entry(entity_id: i64, action: AuditAction) -> NewChangeLogEntry {
        NewChangeLogEntry {
            table_name: "roles".to_string(),
            entity_id,
            action,
            old_values: None,
            new_values: Some(r#"{"name":"x"}"#.to_string()),
            actor: "tester".to_string(),
            created_at: 10,
        }
    }

    #[test]
    fn append_then_filter_by_entity_and_action() {
        let sink = SqliteAuditSink::try_new(open_audit_db_in_memory().unwrap()).unwrap();
        sink.append(&entry(1, AuditAction::Create)).unwrap();
        sink.append(&entry(2, AuditAction::Create)).unwrap();
        sink.append(&entry(1, AuditAction::Update)).unwrap();

        let for_first = sink.list(&AuditLogQuery::for_entity("roles", 1)).unwrap();
        assert_eq!(for_first.len(), 2);
        assert_eq!(for_first[0].action, AuditAction::Create);
        assert_eq!(for_first[1].action, AuditAction::Update);

        let updates = sink
            .list(&AuditLogQuery {
                action: Some(AuditAction::Update),
                ..AuditLogQuery::default()
            })
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(sink.count().unwrap(), 3);
    }

    #[test]
    fn rejects_entity_store_connection() {
        let result = SqliteAuditSink::try_new(open_db_in_memory().unwrap());
        match result {
            Err(AuditError::UninitializedConnection {
                expected_version,
                actual_version,
            }) => {
                assert_eq!(expected_version, latest_audit_version());
                assert_eq!(actual_version, latest_version());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("entity-store connection must be rejected"),
        }
    }

    #[test]
    fn rejects_connection_without_change_log_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {};", latest_audit_version()))
            .unwrap();

        let result = SqliteAuditSink::try_new(conn);
        assert!(matches!(
            result,
            Err(AuditError::MissingRequiredTable("change_log"))
        ));
    }
}
