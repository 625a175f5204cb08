//! Core scheduling machinery: context registry, ready queue, transfer gates,
//! environment bundles, and the schedule-like operation protocol.

pub mod context;
pub mod env;
pub mod error;
pub(crate) mod queue;
pub mod scheduler;
pub mod slf;
pub mod trace;
pub mod transfer;

pub use context::{ContextId, ContextState, Readiness};
pub use env::{EnvBundle, IoTarget, SaveMask};
pub use error::{AppResult, SchedError};
pub use scheduler::{SchedStats, Scheduler};
pub use slf::{ScheduleLike, SlfInit, SlfRequest};
pub use trace::{InMemoryTraceSink, TraceAction, TraceEvent, TraceSink};
pub use transfer::TransferArgs;
