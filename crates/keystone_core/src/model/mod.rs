//! Entity model shared by every stored kind.
//!
//! # Responsibility
//! - Define the base shape (`EntityMeta`) and the `Entity` contract that the
//!   generic store is written against.
//! - Provide the administrative reference kinds stored by this core.
//!
//! # Invariants
//! - Every stored kind embeds exactly one `EntityMeta`.
//! - Deletion is represented by soft-delete tombstones, never by row removal.

pub mod country;
pub mod entity;
pub mod person;
pub mod role;
