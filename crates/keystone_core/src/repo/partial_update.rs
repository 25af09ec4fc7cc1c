//! Sparse field-map updates driven by per-kind descriptor tables.
//!
//! # Responsibility
//! - Map field names to typed setters, built once per entity kind.
//! - Apply a `FieldPatch` onto a loaded entity, touching only listed keys.
//!
//! # Invariants
//! - Unknown keys and read-only fields are skipped, never rejected.
//! - A value that does not deserialize into the field's type fails the whole
//!   patch before anything is persisted.
//! - `id`, `created_at`, `updated_at` and `deleted_at` are never writable.

use crate::model::entity::Entity;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sparse map of field name to new value.
pub type FieldPatch = BTreeMap<String, Value>;

/// Typed assignment of one untyped value into one entity field.
pub type FieldSetter<T> = fn(&mut T, Value) -> serde_json::Result<()>;

/// Error raised when a patched value cannot be assigned to its field.
#[derive(Debug)]
pub enum FieldError {
    TypeMismatch {
        field: &'static str,
        source: serde_json::Error,
    },
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch { field, source } => {
                write!(f, "value for field `{field}` has the wrong type: {source}")
            }
        }
    }
}

impl Error for FieldError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TypeMismatch { source, .. } => Some(source),
        }
    }
}

/// One named field of an entity kind.
pub struct FieldDescriptor<T> {
    name: &'static str,
    setter: Option<FieldSetter<T>>,
}

impl<T> FieldDescriptor<T> {
    pub fn writable(name: &'static str, setter: FieldSetter<T>) -> Self {
        Self {
            name,
            setter: Some(setter),
        }
    }

    pub fn read_only(name: &'static str) -> Self {
        Self { name, setter: None }
    }
}

/// Descriptor table for one entity kind.
pub struct FieldTable<T> {
    fields: Vec<FieldDescriptor<T>>,
}

impl<T: Entity> FieldTable<T> {
    /// Builds a table from kind-specific descriptors, adding the base fields.
    ///
    /// `status` is writable so re-activation stays a plain field update.
    pub fn with_base_fields(fields: Vec<FieldDescriptor<T>>) -> Self {
        let mut all = vec![
            FieldDescriptor::read_only("id"),
            FieldDescriptor::writable("status", |entity: &mut T, value| {
                assign(&mut entity.meta_mut().status, value)
            }),
            FieldDescriptor::read_only("created_at"),
            FieldDescriptor::read_only("updated_at"),
            FieldDescriptor::read_only("deleted_at"),
        ];
        all.extend(fields);
        Self { fields: all }
    }
}

impl<T> FieldTable<T> {
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Keys applied and keys skipped by one `apply_patch` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub applied: Vec<&'static str>,
    pub skipped: Vec<String>,
}

/// Applies `patch` onto `entity` using the kind's descriptor table.
///
/// Assignments run against a scratch copy, so a type mismatch leaves
/// `entity` untouched.
pub fn apply_patch<T: Entity>(
    entity: &mut T,
    patch: &FieldPatch,
) -> Result<PatchOutcome, FieldError> {
    let table = T::field_table();
    let mut scratch = entity.clone();
    let mut outcome = PatchOutcome::default();

    for (name, value) in patch {
        let Some(descriptor) = table.get(name) else {
            outcome.skipped.push(name.clone());
            continue;
        };
        let Some(setter) = descriptor.setter else {
            outcome.skipped.push(name.clone());
            continue;
        };

        setter(&mut scratch, value.clone()).map_err(|source| FieldError::TypeMismatch {
            field: descriptor.name,
            source,
        })?;
        outcome.applied.push(descriptor.name);
    }

    *entity = scratch;
    Ok(outcome)
}

/// Deserializes `value` into the field's declared type and stores it.
pub fn assign<F: DeserializeOwned>(slot: &mut F, value: Value) -> serde_json::Result<()> {
    *slot = serde_json::from_value(value)?;
    Ok(())
}
