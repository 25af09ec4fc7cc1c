//! Change-log record types and audit error taxonomy.

use crate::db::DbError;
use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AuditResult<T> = Result<T, AuditError>;

/// Errors raised by change-log sinks and the recorder.
#[derive(Debug)]
pub enum AuditError {
    Db(DbError),
    /// Background writer is gone; nothing can be enqueued.
    WorkerUnavailable,
    /// Background writer thread could not be started.
    Spawn(std::io::Error),
    /// Persisted change-log data cannot be converted to a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected change-log version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for AuditError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::WorkerUnavailable => write!(f, "change-log writer is not running"),
            Self::Spawn(err) => write!(f, "failed to start change-log writer: {err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted change-log data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "change-log schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for AuditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Spawn(err) => Some(err),
            Self::WorkerUnavailable
            | Self::InvalidData(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for AuditError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for AuditError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Mutation kind recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row handed to a sink; the sink assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChangeLogEntry {
    pub table_name: String,
    pub entity_id: EntityId,
    pub action: AuditAction,
    /// Compact JSON of the stored values. `None` for creates.
    pub old_values: Option<String>,
    /// Compact JSON of the written values. `None` for deletes.
    pub new_values: Option<String>,
    pub actor: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Persisted change-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogRecord {
    pub id: i64,
    pub table_name: String,
    pub entity_id: EntityId,
    pub action: AuditAction,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub actor: String,
    pub created_at: i64,
}

impl ChangeLogRecord {
    /// Parses `old_values` back into a JSON field map.
    pub fn old_values_json(&self) -> Option<serde_json::Value> {
        parse_values(self.old_values.as_deref())
    }

    /// Parses `new_values` back into a JSON field map.
    pub fn new_values_json(&self) -> Option<serde_json::Value> {
        parse_values(self.new_values.as_deref())
    }
}

fn parse_values(raw: Option<&str>) -> Option<serde_json::Value> {
    raw.and_then(|text| serde_json::from_str(text).ok())
}

#[cfg(test)]
mod tests {
    use super::AuditAction;

    #[test]
    fn action_names_roundtrip() {
        for action in [AuditAction::Create, AuditAction::Update, AuditAction::Delete] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("Modified"), None);
    }
}
