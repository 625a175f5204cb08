//! Transfer handshake primitives.
//!
//! A context switch in this crate is a token handoff between per-context
//! gates: the dispatcher opens the target's gate and parks the source on its
//! own. The carrier thread parked on a gate owns that context's stack, so the
//! handoff is the save/restore of machine state.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::context::ContextId;

/// The `(prev, next)` pair a dispatch is about to switch between.
///
/// Handed to an SLF operation's `prepare` callback so it can register the
/// suspending context on a wait list before the switch, leaving no window in
/// which a wakeup could be missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferArgs {
    /// Context being suspended.
    pub prev: ContextId,
    /// Context being resumed.
    pub next: ContextId,
}

/// Binary gate parking one context's carrier thread.
///
/// Holds at most one token. `open` deposits the token and wakes the owner;
/// `wait` parks until a token is present and consumes it. A deposit made
/// before the owner parks is not lost.
pub(crate) struct Gate {
    open: Mutex<bool>,
    resumed: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            open: Mutex::new(false),
            resumed: Condvar::new(),
        }
    }

    /// Deposit the run token and wake the parked owner, if any.
    pub(crate) fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        drop(open);
        self.resumed.notify_one();
    }

    /// Park until the run token arrives, then consume it.
    pub(crate) fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.resumed.wait(&mut open);
        }
        *open = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_token_deposited_before_wait_is_kept() {
        let gate = Gate::new();
        gate.open();
        // Must not block: the token was already there.
        gate.wait();
    }

    #[test]
    fn test_wait_blocks_until_open() {
        let gate = Arc::new(Gate::new());
        let opener = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            opener.open();
        });
        gate.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_token_is_consumed() {
        let gate = Arc::new(Gate::new());
        gate.open();
        gate.wait();

        // Second wait must block again until a fresh token arrives.
        let opener = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            opener.open();
        });
        gate.wait();
        handle.join().unwrap();
    }
}
