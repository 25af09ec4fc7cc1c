//! CLI smoke entry point.
//!
//! Opens the stores described by an optional JSON config file (first
//! argument) and `KEYSTONE_*` environment overrides, in-memory by default.
//! Walks one role through create, patch and delete, then prints the role and
//! its change-log trail.

use keystone_core::{
    core_version, init_logging_from_config, AuditLogQuery, CallContext, CoreConfig, Entity,
    EntityStore, FieldPatch, Role,
};
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("keystone: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::default(),
    }
    .apply_env()?;
    init_logging_from_config(&config)?;
    println!("keystone_core version={}", core_version());

    let handles = config.open()?;
    let ctx = CallContext::for_actor("cli");
    let roles = handles.store::<Role>()?;

    let created = roles.create(&ctx, Role::new("X", Some("smoke role")))?;
    let patch = FieldPatch::from([("name".to_string(), json!("Y"))]);
    roles.update_partial(&ctx, created.id(), &patch)?;
    roles.soft_delete(&ctx, created.id())?;

    let stored = roles
        .get_by_id(created.id())?
        .ok_or("role disappeared after soft delete")?;
    println!("{}", serde_json::to_string_pretty(&stored)?);

    handles.recorder.flush()?;
    let trail = handles
        .audit_log
        .list(&AuditLogQuery::for_entity(Role::TABLE, created.id()))?;
    for record in trail {
        println!(
            "#{} {} {}#{} by {} old={} new={}",
            record.id,
            record.action,
            record.table_name,
            record.entity_id,
            record.actor,
            record.old_values.as_deref().unwrap_or("-"),
            record.new_values.as_deref().unwrap_or("-"),
        );
    }

    log::info!("event=cli_smoke module=cli status=ok");
    Ok(())
}
