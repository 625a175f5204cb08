//! Counting semaphore built on the schedule-like operation protocol.
//!
//! `acquire` with a permit available completes inline, no queue traffic and
//! no switch. Without one it suspends the calling context on a FIFO wait
//! list until some context or foreign thread calls `release`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::context::ContextId;
use crate::core::scheduler::Scheduler;
use crate::core::slf::{ScheduleLike, SlfInit, SlfRequest};
use crate::core::transfer::TransferArgs;

#[derive(Debug)]
struct SemState {
    permits: usize,
    waiters: VecDeque<ContextId>,
}

/// Counting semaphore. Clones share the permit pool.
#[derive(Debug, Clone)]
pub struct Semaphore {
    state: Arc<Mutex<SemState>>,
}

impl Semaphore {
    /// New semaphore holding `permits` permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SemState {
                permits,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Take a permit without suspending. `false` when none is available.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            true
        } else {
            false
        }
    }

    /// Take a permit, suspending the calling context until one is released.
    ///
    /// # Panics
    ///
    /// Panics with a cooperative deadlock diagnostic when it must suspend
    /// and nothing else is ready to run.
    pub fn acquire(&self, sched: &Scheduler) {
        sched.run_slf(Acquire { sem: self.clone() });
    }

    /// Return a permit and wake the longest-waiting live context, if any.
    ///
    /// The woken context re-checks on resume; a permit taken by someone else
    /// in the meantime simply puts it back on the wait list.
    pub fn release(&self, sched: &Scheduler) {
        let mut state = self.state.lock();
        state.permits += 1;
        loop {
            let Some(waiter) = state.waiters.pop_front() else {
                return;
            };
            drop(state);
            if sched.ready(waiter).is_ok() {
                return;
            }
            // Dead or stale waiter; wake the next one instead.
            state = self.state.lock();
        }
    }

    /// Permits currently available.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.state.lock().permits
    }

    /// Contexts currently suspended on the wait list.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// The acquire operation driven through [`Scheduler::run_slf`].
struct Acquire {
    sem: Semaphore,
}

impl ScheduleLike for Acquire {
    type Output = ();

    fn init(&mut self, _sched: &Scheduler) -> SlfInit<()> {
        let mut state = self.sem.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            SlfInit::Immediate(())
        } else {
            SlfInit::Suspend(SlfRequest::Schedule)
        }
    }

    fn prepare(&mut self, sched: &Scheduler, args: &TransferArgs) {
        let mut state = self.sem.state.lock();
        if !state.waiters.contains(&args.prev) {
            state.waiters.push_back(args.prev);
        }
        let missed_release = state.permits > 0;
        drop(state);
        // A release that ran before we were on the wait list found nobody to
        // wake; claim that wakeup now so the permit is not stranded.
        if missed_release {
            let _ = sched.ready(args.prev);
        }
    }

    fn check(&mut self, sched: &Scheduler) -> bool {
        let me = sched.current();
        let mut state = self.sem.state.lock();
        if state.permits > 0 {
            state.permits -= 1;
            state.waiters.retain(|ctx| *ctx != me);
            false
        } else {
            true
        }
    }

    fn take_result(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_counts_permits() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire());
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
        assert_eq!(sem.permits(), 0);
    }

    #[test]
    fn test_release_without_waiters_banks_the_permit() {
        let sched = Scheduler::new();
        let sem = Semaphore::new(0);
        sem.release(&sched);
        assert_eq!(sem.permits(), 1);
        assert!(sem.try_acquire());
    }

    #[test]
    fn test_acquire_with_permit_is_inline() {
        let sched = Scheduler::new();
        let sem = Semaphore::new(1);
        let before = sched.stats();
        sem.acquire(&sched);
        let after = sched.stats();
        assert_eq!(after.transfers, before.transfers);
        assert_eq!(after.dispatches, before.dispatches);
        assert_eq!(sem.permits(), 0);
    }
}
