//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::context::ContextId;

/// Errors surfaced to callers of scheduler operations.
///
/// Invariant violations (transferring into a dead context, dispatching from an
/// empty ready queue, driving a yield primitive from a foreign thread) are not
/// represented here; those abort loudly instead of returning.
#[derive(Debug, Error)]
pub enum SchedError {
    /// Handle does not name a live context (slot reused or never allocated).
    #[error("unknown context {0}")]
    UnknownContext(ContextId),
    /// Context has already finished.
    #[error("context {0} is dead")]
    DeadContext(ContextId),
    /// Carrier thread for a context could not be started.
    #[error("failed to spawn context carrier: {0}")]
    Spawn(#[from] std::io::Error),
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
