//! Generic entity store and its helpers.
//!
//! # Responsibility
//! - Define the typed CRUD contract every entity kind is served through.
//! - Isolate SQLite query details from callers.
//!
//! # Invariants
//! - Not-found is reported through `None`/`false`, never through an error.
//! - Every mutating call runs the save pipeline exactly once.

pub mod active_filter;
pub mod entity_store;
pub mod partial_update;
