use keystone_core::{CallContext, CoreConfig, Entity, EntityStore, FieldPatch, Role, StoreError};
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::Mutex;

#[derive(Default)]
struct CapturingLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: Lazy<CapturingLogger> = Lazy::new(CapturingLogger::default);

fn install_logger() -> &'static CapturingLogger {
    if log::set_logger(&*LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
    &LOGGER
}

fn error_lines(logger: &CapturingLogger) -> Vec<String> {
    logger
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, _)| *level == Level::Error)
        .map(|(_, line)| line.clone())
        .collect()
}

#[test]
fn failed_reads_and_row_loads_are_logged_at_error_level() {
    let logger = install_logger();
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    let created = roles.create(&ctx, Role::new("broken", None)).unwrap();
    handles
        .conn
        .execute("UPDATE roles SET status = 0 WHERE id = ?1;", [created.id()])
        .unwrap();
    assert!(error_lines(logger).is_empty());

    let err = roles.get_by_id(created.id()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    let err = roles.get_all_with_inactive().unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    let err = roles.find(&|_: &Role| true).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    let err = roles.soft_delete(&ctx, created.id()).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
    let patch = FieldPatch::from([("name".to_string(), json!("fixed"))]);
    let err = roles.update_partial(&ctx, created.id(), &patch).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));

    let lines = error_lines(logger);
    assert_eq!(lines.len(), 5, "unexpected error lines: {lines:?}");
    assert!(lines.iter().all(|line| line.contains("module=store status=error table=roles")));
    let read_failures = lines
        .iter()
        .filter(|line| line.starts_with("event=entity_read "))
        .count();
    assert_eq!(read_failures, 3);
    assert!(lines.iter().any(|line| line.starts_with("event=entity_soft_delete ")));
    assert!(lines.iter().any(|line| line.starts_with("event=entity_patch ")));
}
