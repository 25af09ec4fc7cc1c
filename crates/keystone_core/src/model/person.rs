//! Person reference data.
//!
//! # Invariants
//! - `country_id`, when set, references a `countries` row (enforced by SQLite).

use crate::model::entity::{optional_integer, optional_text, text, Entity, EntityId, EntityMeta};
use crate::repo::partial_update::{assign, FieldDescriptor, FieldTable};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

static PERSON_FIELDS: Lazy<FieldTable<Person>> = Lazy::new(|| {
    FieldTable::with_base_fields(vec![
        FieldDescriptor::writable("first_name", |person: &mut Person, value| {
            assign(&mut person.first_name, value)
        }),
        FieldDescriptor::writable("last_name", |person: &mut Person, value| {
            assign(&mut person.last_name, value)
        }),
        FieldDescriptor::writable("email", |person: &mut Person, value| {
            assign(&mut person.email, value)
        }),
        FieldDescriptor::writable("country_id", |person: &mut Person, value| {
            assign(&mut person.country_id, value)
        }),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub country_id: Option<EntityId>,
}

impl Person {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::default(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            country_id: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for Person {
    const TABLE: &'static str = "persons";
    const COLUMNS: &'static [&'static str] = &["first_name", "last_name", "email", "country_id"];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            text(&self.first_name),
            text(&self.last_name),
            optional_text(self.email.as_deref()),
            optional_integer(self.country_id),
        ]
    }

    fn from_row(meta: EntityMeta, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            country_id: row.get("country_id")?,
        })
    }

    fn field_table() -> &'static FieldTable<Self> {
        &PERSON_FIELDS
    }
}
