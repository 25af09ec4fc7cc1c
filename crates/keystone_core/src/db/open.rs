//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory connections for the entity store and the
//!   change-log store.
//! - Configure connection pragmas required by core behavior.
//! - Trigger the matching migration chain before returning a connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::{apply_audit_migrations, apply_migrations};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
enum StoreKind {
    Entity,
    Audit,
}

impl StoreKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Audit => "audit",
        }
    }
}

/// Opens the entity-store database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(StoreKind::Entity, "file", || Connection::open(path))
}

/// Opens an in-memory entity-store database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(StoreKind::Entity, "memory", Connection::open_in_memory)
}

/// Opens the change-log database file and applies its migration chain.
pub fn open_audit_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with(StoreKind::Audit, "file", || Connection::open(path))
}

/// Opens an in-memory change-log database and applies its migration chain.
pub fn open_audit_db_in_memory() -> DbResult<Connection> {
    open_with(StoreKind::Audit, "memory", Connection::open_in_memory)
}

fn open_with<F>(kind: StoreKind, mode: &str, connect: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start store={} mode={mode}",
        kind.as_str()
    );

    let mut conn = match connect() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error store={} mode={mode} duration_ms={} error_code=db_open_failed error={}",
                kind.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, kind) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok store={} mode={mode} duration_ms={}",
                kind.as_str(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error store={} mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                kind.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, kind: StoreKind) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    match kind {
        StoreKind::Entity => apply_migrations(conn)?,
        StoreKind::Audit => apply_audit_migrations(conn)?,
    }
    Ok(())
}
