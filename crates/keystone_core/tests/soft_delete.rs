use keystone_core::{CallContext, CoreConfig, Entity, EntityStore, Role};

fn physical_row_count(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM roles;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn delete_keeps_row_and_flips_status() {
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    let created = roles.create(&ctx, Role::new("operator", None)).unwrap();
    assert!(roles.delete(&ctx, created.id()).unwrap());

    assert!(roles.get_all().unwrap().is_empty());
    let all = roles.get_all_with_inactive().unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all[0].meta.status);
    assert!(all[0].meta.deleted_at.is_some());
    assert_eq!(all[0].meta.created_at, created.meta.created_at);
    assert_eq!(physical_row_count(&handles.conn), 1);
}

#[test]
fn soft_delete_is_idempotent() {
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    let created = roles.create(&ctx, Role::new("auditor", None)).unwrap();

    assert!(roles.soft_delete(&ctx, created.id()).unwrap());
    let first = roles.get_by_id(created.id()).unwrap().unwrap();
    assert!(!first.meta.status);
    assert!(first.meta.deleted_at.is_some());

    assert!(roles.soft_delete(&ctx, created.id()).unwrap());
    assert!(roles.delete(&ctx, created.id()).unwrap());
    let again = roles.get_by_id(created.id()).unwrap().unwrap();
    assert!(!again.meta.status);
    assert!(again.meta.deleted_at.is_some());
}

#[test]
fn no_delete_sequence_removes_rows() {
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    let ids: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|name| roles.create(&ctx, Role::new(name, None)).unwrap().id())
        .collect();

    for id in &ids {
        roles.delete(&ctx, *id).unwrap();
        roles.soft_delete(&ctx, *id).unwrap();
        roles.delete(&ctx, *id).unwrap();
    }

    let remaining: Vec<_> = roles
        .get_all_with_inactive()
        .unwrap()
        .into_iter()
        .map(|role| role.id())
        .collect();
    assert_eq!(remaining, ids);
    assert_eq!(physical_row_count(&handles.conn), 3);
}

#[test]
fn deleting_missing_row_returns_false() {
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    assert!(!roles.delete(&ctx, 999).unwrap());
    assert!(!roles.soft_delete(&ctx, 999).unwrap());
}

#[test]
fn restore_reactivates_through_plain_update() {
    let handles = CoreConfig::default().open().unwrap();
    let roles = handles.store::<Role>().unwrap();
    let ctx = CallContext::system();

    let created = roles.create(&ctx, Role::new("support", Some("tier 1"))).unwrap();
    roles.soft_delete(&ctx, created.id()).unwrap();

    let restored = roles.restore(&ctx, created.id()).unwrap().unwrap();
    assert!(restored.meta.status);
    assert_eq!(restored.meta.deleted_at, None);
    assert_eq!(restored.description.as_deref(), Some("tier 1"));
    assert_eq!(roles.get_all().unwrap().len(), 1);

    assert!(roles.restore(&ctx, 404).unwrap().is_none());
}
