//! Per-call context passed into every mutating store operation.
//!
//! # Responsibility
//! - Carry the caller identity stamped onto change-log rows.
//! - Carry the cancellation signal honored up to commit.
//!
//! # Invariants
//! - An absent actor is recorded as `SYSTEM_ACTOR`.
//! - Cancellation is observed only before commit; after commit the change-log
//!   enqueue always runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Actor recorded when no caller identity is known.
pub const SYSTEM_ACTOR: &str = "system";

/// Source of the current caller identity.
pub trait ActorProvider {
    /// Returns the caller name, or `None` for anonymous/system calls.
    fn current_actor(&self) -> Option<String>;
}

/// Shared cancellation flag. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Explicit context for one store call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    actor: Option<String>,
    cancel: CancelFlag,
}

impl CallContext {
    /// Context attributed to the system actor, never cancelled.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            cancel: CancelFlag::default(),
        }
    }

    pub fn from_provider(provider: &dyn ActorProvider) -> Self {
        Self {
            actor: provider.current_actor(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Caller identity, or `SYSTEM_ACTOR` when none was supplied.
    pub fn actor_name(&self) -> &str {
        match self.actor.as_deref() {
            Some(actor) if !actor.trim().is_empty() => actor,
            _ => SYSTEM_ACTOR,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
