//! Generic persistence core for the Keystone administrative backend.
//!
//! Every entity kind is served by one typed store whose saves rewrite
//! deletions into tombstones and mirror each mutation into a separate,
//! append-only change log.

pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod unit_of_work;

pub use audit::collector::ChangeSnapshot;
pub use audit::record::{AuditAction, AuditError, AuditResult, ChangeLogRecord, NewChangeLogEntry};
pub use audit::recorder::{AuditRecorder, RecorderStats};
pub use audit::sink::{AuditLogQuery, AuditSink, SqliteAuditSink};
pub use config::{ConfigError, CoreConfig, CoreHandles};
pub use context::{ActorProvider, CallContext, CancelFlag, SYSTEM_ACTOR};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::country::Country;
pub use model::entity::{Entity, EntityId, EntityMeta};
pub use model::person::Person;
pub use model::role::Role;
pub use repo::active_filter::ActiveFilter;
pub use repo::entity_store::{
    EntityStore, ListQuery, Predicate, SqliteEntityStore, StoreError, StoreResult,
};
pub use repo::partial_update::{FieldError, FieldPatch, PatchOutcome};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
