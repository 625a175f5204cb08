//! The schedule-like-function (SLF) protocol.
//!
//! An SLF is an operation defined outside the scheduler (a semaphore acquire,
//! a timed sleep, a readiness wait) that may need to suspend the calling
//! coroutine. The protocol splits the operation into three callbacks so the
//! scheduler can drive the suspension without compile-time knowledge of the
//! operation, and so the operation can register itself for wakeup with no
//! window in which a notification could be missed.

use crate::core::scheduler::Scheduler;
use crate::core::transfer::TransferArgs;

/// Yield primitive an SLF asks the scheduler to suspend with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlfRequest {
    /// Suspend via `schedule`: the caller blocks until something readies it.
    Schedule,
    /// Suspend via `cede`: the caller stays runnable at the queue tail.
    Cede,
    /// Suspend via `cede_notself`: like `schedule`, blocking the caller
    /// without requeueing it.
    CedeNotself,
}

/// Outcome of an SLF's `init` callback.
#[derive(Debug)]
pub enum SlfInit<T> {
    /// The operation is already complete. No suspension occurs and
    /// `prepare`/`check` are never invoked; this path costs a function call.
    Immediate(T),
    /// Suspend the caller with the named primitive and run the full
    /// prepare/transfer/check cycle.
    Suspend(SlfRequest),
}

/// An operation that may suspend its caller through the scheduler.
///
/// [`Scheduler::run_slf`] drives one logical call:
///
/// 1. `init` runs inline. Returning [`SlfInit::Immediate`] finishes the call
///    on the spot. Returning [`SlfInit::Suspend`] starts a cycle.
/// 2. `prepare` runs with the concrete `(prev, next)` pair immediately before
///    the switch; registering `prev` on a wait list here cannot race the
///    suspension.
/// 3. The scheduler performs the requested transfer.
/// 4. `check` runs once the caller is resumed. `true` repeats the cycle from
///    step 2; `false` ends the call and `take_result` yields the outcome.
pub trait ScheduleLike {
    /// Result handed back to the caller of the operation.
    type Output;

    /// Validate and capture arguments; decide between the immediate fast
    /// path and a suspension.
    fn init(&mut self, sched: &Scheduler) -> SlfInit<Self::Output>;

    /// Register the suspending context wherever its wakeup will come from.
    /// Runs with the registry unlocked; must not call a yield primitive.
    fn prepare(&mut self, sched: &Scheduler, args: &TransferArgs) {
        let _ = (sched, args);
    }

    /// Decide whether the wake was spurious. Runs on the resumed caller;
    /// `true` runs another cycle with the same primitive.
    fn check(&mut self, sched: &Scheduler) -> bool {
        let _ = sched;
        false
    }

    /// Yield the result after the final `check`. Only invoked on the
    /// suspension path; the fast path returns through `Immediate`.
    fn take_result(&mut self) -> Self::Output;
}
