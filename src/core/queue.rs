//! FIFO ready queue.

use std::collections::VecDeque;

use crate::core::context::ContextId;

/// Strict arrival-order queue of runnable contexts.
///
/// Duplicate-freedom is a state property: callers only push a context they
/// just moved to `ready`, so a context is queued at most once. The queue
/// itself stays a plain deque with an O(1) length.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
    items: VecDeque<ContextId>,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, ctx: ContextId) {
        debug_assert!(!self.items.contains(&ctx), "context queued twice");
        self.items.push_back(ctx);
    }

    pub(crate) fn pop(&mut self) -> Option<ContextId> {
        self.items.pop_front()
    }

    /// Drop a specific context from the queue. Used by direct transfers,
    /// which bypass the FIFO pop but must not leave a queued entry behind.
    pub(crate) fn remove(&mut self, ctx: ContextId) -> bool {
        if let Some(pos) = self.items.iter().position(|c| *c == ctx) {
            self.items.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<ContextId> {
        self.items.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(slot: u32) -> ContextId {
        ContextId::new(slot, 0)
    }

    #[test]
    fn test_fifo_order() {
        let mut q = ReadyQueue::new();
        q.push(ctx(1));
        q.push(ctx(2));
        q.push(ctx(3));

        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some(ctx(1)));
        assert_eq!(q.pop(), Some(ctx(2)));
        assert_eq!(q.pop(), Some(ctx(3)));
        assert_eq!(q.pop(), None);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_remove_preserves_order_of_rest() {
        let mut q = ReadyQueue::new();
        q.push(ctx(1));
        q.push(ctx(2));
        q.push(ctx(3));

        assert!(q.remove(ctx(2)));
        assert!(!q.remove(ctx(2)));
        assert_eq!(q.snapshot(), vec![ctx(1), ctx(3)]);
    }

    #[test]
    fn test_snapshot_is_queue_order() {
        let mut q = ReadyQueue::new();
        q.push(ctx(9));
        q.push(ctx(4));
        assert_eq!(q.snapshot(), vec![ctx(9), ctx(4)]);
        assert_eq!(q.len(), 2);
    }
}
