//! Builder for registering contexts with non-default creation options.

use crate::core::context::ContextId;
use crate::core::error::SchedError;
use crate::core::scheduler::{CreateOpts, Scheduler};

/// Configures one context before registration.
///
/// [`Scheduler::create`] covers the common case; the builder is for naming a
/// context, pinning its stack size, or forcing eager stack materialization in
/// a scheduler that defaults to lazy.
#[derive(Debug, Default, Clone)]
pub struct ContextBuilder {
    name: Option<String>,
    stack_size: Option<usize>,
    eager: bool,
}

impl ContextBuilder {
    /// Start from the scheduler's defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the context. Carrier threads and trace events pick this up.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size in bytes, overriding the scheduler default.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Materialize the stack at registration instead of first dispatch.
    pub fn with_eager_stack(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Register the context.
    ///
    /// # Errors
    ///
    /// [`SchedError::Spawn`] when an eager carrier thread cannot be created.
    pub fn spawn<F>(self, sched: &Scheduler, entry: F) -> Result<ContextId, SchedError>
    where
        F: FnOnce(&Scheduler) + Send + 'static,
    {
        sched.spawn_context(
            CreateOpts {
                name: self.name,
                stack_size: self.stack_size,
                eager: self.eager,
            },
            Box::new(entry),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ContextState;

    #[test]
    fn test_eager_stack_materializes_at_spawn() {
        let sched = Scheduler::new();
        let ctx = ContextBuilder::new()
            .with_name("eager")
            .with_eager_stack()
            .spawn(&sched, |_| {})
            .unwrap();
        assert_eq!(sched.stats().stacks_spawned, 1);
        assert_eq!(sched.state(ctx).unwrap(), ContextState::Fresh);

        sched.ready(ctx).unwrap();
        sched.cede();
        assert_eq!(sched.state(ctx).unwrap(), ContextState::Dead);
    }

    #[test]
    fn test_default_stays_lazy() {
        let sched = Scheduler::new();
        let _ctx = ContextBuilder::new()
            .with_stack_size(256 * 1024)
            .spawn(&sched, |_| {})
            .unwrap();
        assert_eq!(sched.stats().stacks_spawned, 0);
    }
}
