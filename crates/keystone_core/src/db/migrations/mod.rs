//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations for the entity store and the change-log store.
//! - Apply pending migrations of one chain atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic within a chain.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - The two chains never share a database file.

use crate::db::{DbError, DbResult};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const ENTITY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_admin_schema.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_persons.sql"),
    },
];

const AUDIT_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("audit_0001_change_log.sql"),
}];

/// Returns the latest entity-store migration version known by this binary.
pub fn latest_version() -> u32 {
    last_version(ENTITY_MIGRATIONS)
}

/// Returns the latest change-log migration version known by this binary.
pub fn latest_audit_version() -> u32 {
    last_version(AUDIT_MIGRATIONS)
}

/// Applies all pending entity-store migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_chain(conn, ENTITY_MIGRATIONS)
}

/// Applies all pending change-log migrations on the provided connection.
pub fn apply_audit_migrations(conn: &mut Connection) -> DbResult<()> {
    apply_chain(conn, AUDIT_MIGRATIONS)
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn last_version(chain: &[Migration]) -> u32 {
    chain.last().map_or(0, |migration| migration.version)
}

fn apply_chain(conn: &mut Connection, chain: &[Migration]) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = last_version(chain);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in chain {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}
