//! Active-row restriction applied by default list operations.
//!
//! Every stored kind embeds `EntityMeta`, so every kind has a `status`
//! column to filter on.

use crate::model::entity::Entity;

/// Which rows a list operation returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActiveFilter {
    /// Only rows with `status = true`.
    #[default]
    ActiveOnly,
    /// Every row regardless of `status`.
    IncludeInactive,
}

impl ActiveFilter {
    pub fn from_include_inactive(include_inactive: bool) -> Self {
        if include_inactive {
            Self::IncludeInactive
        } else {
            Self::ActiveOnly
        }
    }

    /// SQL predicate over the `status` column, if the filter restricts rows.
    pub fn sql_predicate(self) -> Option<&'static str> {
        match self {
            Self::ActiveOnly => Some("status = 1"),
            Self::IncludeInactive => None,
        }
    }

    /// In-memory form of the same predicate.
    pub fn matches<T: Entity>(self, entity: &T) -> bool {
        match self {
            Self::ActiveOnly => entity.is_active(),
            Self::IncludeInactive => true,
        }
    }

    pub fn retain<T: Entity>(self, rows: &mut Vec<T>) {
        rows.retain(|row| self.matches(row));
    }
}
