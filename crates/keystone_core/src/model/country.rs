//! Geography reference data.

use crate::model::entity::{text, Entity, EntityMeta};
use crate::repo::partial_update::{assign, FieldDescriptor, FieldTable};
use once_cell::sync::Lazy;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

static COUNTRY_FIELDS: Lazy<FieldTable<Country>> = Lazy::new(|| {
    FieldTable::with_base_fields(vec![
        FieldDescriptor::writable("iso_code", |country: &mut Country, value| {
            assign(&mut country.iso_code, value)
        }),
        FieldDescriptor::writable("name", |country: &mut Country, value| {
            assign(&mut country.name, value)
        }),
    ])
});

/// Country keyed by its ISO 3166 alpha-2 code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub iso_code: String,
    pub name: String,
}

impl Country {
    pub fn new(iso_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            meta: EntityMeta::default(),
            iso_code: iso_code.into(),
            name: name.into(),
        }
    }
}

impl Entity for Country {
    const TABLE: &'static str = "countries";
    const COLUMNS: &'static [&'static str] = &["iso_code", "name"];

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn column_values(&self) -> Vec<Value> {
        vec![text(&self.iso_code), text(&self.name)]
    }

    fn from_row(meta: EntityMeta, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            meta,
            iso_code: row.get("iso_code")?,
            name: row.get("name")?,
        })
    }

    fn field_table() -> &'static FieldTable<Self> {
        &COUNTRY_FIELDS
    }
}
