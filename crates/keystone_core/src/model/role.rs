//! Security role reference data.

use crate::model::entity::{optional_text, text, Entity, EntityMeta};
use crate::repo::partial_update::{assign, FieldDescriptor, FieldTable};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

static ROLE_FIELDS: Lazy<FieldTable<Role>> = Lazy::new(|| {
    FieldTable::with_base_fields(vec![
        FieldDescriptor::writable("name", |role: &mut Role, value| assign(&mut role.name, value)),
        FieldDescriptor::writable("description", |role: &mut Role, value| {
            assign(&mut role.description, value)
        }),
    ])
});

/// Named security role that permissions are granted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            meta: EntityMeta::default(),
            name: name.into(),
            description: description.map(str::to_string),
        }
    }
}

impl Entity for Role {
    const TABLE: &'static str = "roles";
    const COLUMNS: &'static [&'static str] = &["name", "description"];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn column_values(&self) -> Vec<Value> {
        vec![text(&self.name), optional_text(self.description.as_deref())]
    }

    fn from_row(meta: EntityMeta, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            name: row.get("name")?,
            description: row.get("description")?,
        })
    }

    fn field_table() -> &'static FieldTable<Self> {
        &ROLE_FIELDS
    }
}
