//! Change-log capture and persistence.
//!
//! # Responsibility
//! - Capture before/after snapshots ahead of the entity-store commit.
//! - Persist one change-log row per mutated entity after the commit.
//!
//! # Invariants
//! - Snapshot capture happens before commit; log writes happen after it.
//! - Change-log failures never fail or roll back the entity-store write.

pub mod collector;
pub mod recorder;
pub mod record;
pub mod sink;
