//! Context handles, lifecycle states, and readiness outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an execution context registered with a [`Scheduler`].
///
/// Handles are slot indices paired with a generation counter. When a context
/// dies its slot may be reused; the generation changes, so handles to the old
/// occupant stop resolving instead of silently naming the new one.
///
/// [`Scheduler`]: crate::core::scheduler::Scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId {
    slot: u32,
    generation: u32,
}

impl ContextId {
    pub(crate) const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot index in the context table.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.slot as usize
    }

    /// Generation of the slot this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}.{}", self.slot, self.generation)
    }
}

/// Lifecycle state of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Created, never run; its stack may not be materialized yet.
    Fresh,
    /// Runnable and waiting in the ready queue.
    Ready,
    /// Currently executing. At most one context per scheduler is running.
    Running,
    /// Suspended and not queued; resumes only after an explicit `ready`.
    Blocked,
    /// Finished. Dead contexts never run again and their slot may be reused.
    Dead,
}

/// Outcome of [`Scheduler::ready`](crate::core::scheduler::Scheduler::ready).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The context was appended to the ready queue by this call.
    NewlyEnqueued,
    /// The context was already running or already queued; nothing changed.
    AlreadyReady,
}
