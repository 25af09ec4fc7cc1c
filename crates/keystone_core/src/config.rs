//! Core configuration and store bootstrap.
//!
//! # Responsibility
//! - Describe where the entity store and the change log live.
//! - Load settings from JSON with `KEYSTONE_*` environment overrides.
//! - Open both stores and start the change-log recorder.
//!
//! # Invariants
//! - Missing database paths mean in-memory databases.
//! - `audit_queue_capacity` is always > 0 after validation.

use crate::audit::record::AuditError;
use crate::audit::recorder::{AuditRecorder, DEFAULT_QUEUE_CAPACITY};
use crate::audit::sink::SqliteAuditSink;
use crate::db::{open_audit_db, open_audit_db_in_memory, open_db, open_db_in_memory, DbError};
use crate::logging::default_log_level;
use crate::model::entity::Entity;
use crate::repo::entity_store::{SqliteEntityStore, StoreResult};
use rusqlite::Connection;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const ENV_DATABASE_PATH: &str = "KEYSTONE_DATABASE_PATH";
const ENV_AUDIT_DATABASE_PATH: &str = "KEYSTONE_AUDIT_DATABASE_PATH";
const ENV_AUDIT_QUEUE_CAPACITY: &str = "KEYSTONE_AUDIT_QUEUE_CAPACITY";
const ENV_LOG_LEVEL: &str = "KEYSTONE_LOG_LEVEL";
const ENV_LOG_DIR: &str = "KEYSTONE_LOG_DIR";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
    Db(DbError),
    Audit(AuditError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Audit(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Audit(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<DbError> for ConfigError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<AuditError> for ConfigError {
    fn from(value: AuditError) -> Self {
        Self::Audit(value)
    }
}

/// Settings for one core instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Entity-store database file. `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    /// Change-log database file. `None` opens an in-memory database.
    pub audit_database_path: Option<PathBuf>,
    /// Bound of the change-log write queue.
    pub audit_queue_capacity: usize,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            audit_database_path: None,
            audit_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    /// Overrides fields from `KEYSTONE_*` process environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overrides fields from `lookup`, keyed by `KEYSTONE_*` names.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(ENV_AUDIT_DATABASE_PATH) {
            self.audit_database_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_AUDIT_QUEUE_CAPACITY) {
            self.audit_queue_capacity = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{ENV_AUDIT_QUEUE_CAPACITY} must be an integer, got `{raw}`"
                ))
            })?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.database_path.is_some() && self.database_path == self.audit_database_path {
            return Err(ConfigError::Invalid(
                "database_path and audit_database_path must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Opens both stores and starts the change-log recorder.
    pub fn open(&self) -> Result<CoreHandles, ConfigError> {
        self.validate()?;

        let conn = match self.database_path.as_deref() {
            Some(path) => open_db(path)?,
            None => open_db_in_memory()?,
        };
        let audit_conn = match self.audit_database_path.as_deref() {
            Some(path) => open_audit_db(path)?,
            None => open_audit_db_in_memory()?,
        };

        let audit_log = SqliteAuditSink::try_new(audit_conn)?;
        let recorder = AuditRecorder::start(audit_log.clone(), self.audit_queue_capacity)?;

        Ok(CoreHandles {
            conn,
            audit_log,
            recorder,
        })
    }
}

/// Opened stores for one core instance.
pub struct CoreHandles {
    pub conn: Connection,
    /// Read handle on the change log; shares the recorder's connection.
    pub audit_log: SqliteAuditSink,
    pub recorder: AuditRecorder,
}

impl CoreHandles {
    pub fn store<T: Entity>(&self) -> StoreResult<SqliteEntityStore<'_, T>> {
        SqliteEntityStore::try_new(&self.conn, &self.recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_json_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.audit_queue_capacity, 256);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_json_str(r#"{"database": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_queue_capacity_is_invalid() {
        let err = CoreConfig::from_json_str(r#"{"audit_queue_capacity": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let config = CoreConfig::from_json_str(r#"{"audit_queue_capacity": 8}"#)
            .unwrap()
            .apply_env_from(|key| match key {
                "KEYSTONE_AUDIT_QUEUE_CAPACITY" => Some("32".to_string()),
                "KEYSTONE_DATABASE_PATH" => Some("/tmp/keystone.db".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.audit_queue_capacity, 32);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/keystone.db")));
    }

    #[test]
    fn same_path_for_both_stores_is_invalid() {
        let err = CoreConfig::from_json_str(
            r#"{"database_path": "/tmp/a.db", "audit_database_path": "/tmp/a.db"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn loads_settings_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.json");
        std::fs::write(
            &path,
            r#"{"audit_queue_capacity": 16, "log_level": "warn", "database_path": "/tmp/k.db"}"#,
        )
        .unwrap();

        let config = CoreConfig::from_json_file(&path).unwrap();
        assert_eq!(config.audit_queue_capacity, 16);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/k.db")));
        assert_eq!(config.audit_database_path, None);
    }

    #[test]
    fn missing_json_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CoreConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn open_in_memory_yields_ready_handles() {
        let handles = CoreConfig::default().open().unwrap();
        assert_eq!(handles.audit_log.count().unwrap(), 0);
    }
}
