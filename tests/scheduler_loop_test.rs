//! Integration test for queue discipline and the yield primitives.
//!
//! This test validates:
//! 1. Ready contexts dispatch in strict FIFO order
//! 2. The ready queue holds exactly the runnable, non-current contexts
//! 3. cede requeues the caller at the tail; schedule leaves it blocked
//! 4. cede_notself suspends the caller until an explicit ready
//! 5. ready is safe from foreign threads
//! 6. Two schedulers are fully independent universes
//! 7. The trace sink sees the lifecycle in dispatch order

use std::sync::Arc;

use parking_lot::Mutex;

use cedence::builders::ContextBuilder;
use cedence::core::{ContextState, Scheduler, TraceAction, TraceEvent, TraceSink};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(log: &Log, tag: &'static str) {
    log.lock().push(tag);
}

/// Forwards events into a shared vector the test keeps a handle to.
struct ForwardingSink(Arc<Mutex<Vec<TraceEvent>>>);

impl TraceSink for ForwardingSink {
    fn record(&mut self, event: TraceEvent) {
        self.0.lock().push(event);
    }
}

#[test]
fn test_fifo_dispatch_order() {
    let sched = Scheduler::new();
    let log = new_log();

    let log_a = Arc::clone(&log);
    let log_b = Arc::clone(&log);
    let log_c = Arc::clone(&log);
    let a = sched.create(move |_| push(&log_a, "a"));
    let b = sched.create(move |_| push(&log_b, "b"));
    let c = sched.create(move |_| push(&log_c, "c"));

    sched.ready(a).unwrap();
    sched.ready(b).unwrap();
    sched.ready(c).unwrap();
    assert_eq!(sched.ready_order(), vec![a, b, c]);

    // One cede drains all three: each finishes and dispatch falls through
    // to the next queue head, with main requeued at the tail.
    sched.cede();

    assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    assert_eq!(sched.ready_count(), 0);
    assert_eq!(sched.state(a).unwrap(), ContextState::Dead);
}

#[test]
fn test_fifo_matches_arbitrary_arrival_order() {
    use rand::seq::SliceRandom;

    let sched = Scheduler::new();
    let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let mut workers = Vec::new();
    for tag in 0..8 {
        let log_w = Arc::clone(&log);
        workers.push((tag, sched.create(move |_| log_w.lock().push(tag))));
    }
    workers.shuffle(&mut rand::rng());

    for (_, ctx) in &workers {
        sched.ready(*ctx).unwrap();
    }
    let queued: Vec<_> = workers.iter().map(|(_, ctx)| *ctx).collect();
    assert_eq!(sched.ready_order(), queued);

    sched.cede();
    let arrival: Vec<usize> = workers.iter().map(|(tag, _)| *tag).collect();
    assert_eq!(*log.lock(), arrival);
}

#[test]
fn test_ready_queue_holds_exactly_the_runnable() {
    let sched = Scheduler::new();
    let main = sched.current();

    let worker = sched.create(|s| s.cede_notself());

    // Fresh: not queued.
    assert!(!sched.is_ready(worker));
    assert_eq!(sched.ready_order(), Vec::new());

    // Readied: queued once, idempotently.
    sched.ready(worker).unwrap();
    sched.ready(worker).unwrap();
    assert_eq!(sched.ready_order(), vec![worker]);

    // Running context is never in the queue.
    assert!(!sched.is_ready(main));

    // Blocked after its cede_notself: out of the queue again.
    sched.cede();
    assert_eq!(sched.state(worker).unwrap(), ContextState::Blocked);
    assert!(!sched.is_ready(worker));

    // Let it finish.
    sched.ready(worker).unwrap();
    sched.cede();
    assert_eq!(sched.state(worker).unwrap(), ContextState::Dead);
}

#[test]
fn test_cede_requeues_at_the_tail() {
    let sched = Scheduler::new();
    let log = new_log();

    let log_a = Arc::clone(&log);
    let log_b = Arc::clone(&log);
    let a = sched.create(move |s| {
        push(&log_a, "a1");
        s.cede();
        push(&log_a, "a2");
    });
    let b = sched.create(move |s| {
        push(&log_b, "b1");
        s.cede();
        push(&log_b, "b2");
    });

    sched.ready(a).unwrap();
    sched.ready(b).unwrap();

    // Round one: a and b each run to their cede, landing behind main.
    sched.cede();
    assert_eq!(*log.lock(), vec!["a1", "b1"]);

    // Round two: they resume in the same order and finish.
    sched.cede();
    assert_eq!(*log.lock(), vec!["a1", "b1", "a2", "b2"]);
}

#[test]
fn test_ceding_context_overtaken_by_queued_peer() {
    let sched = Scheduler::new();
    let main = sched.current();
    let log = new_log();

    let log_b = Arc::clone(&log);
    let b = sched.create(move |s| {
        push(&log_b, "b1");
        s.cede();
        push(&log_b, "b2");
        s.ready(main).unwrap();
    });
    let log_c = Arc::clone(&log);
    let c = sched.create(move |s| {
        // b ceded behind us, so it is queued again already.
        assert!(s.is_ready(b));
        push(&log_c, "c");
    });

    sched.ready(b).unwrap();
    sched.ready(c).unwrap();
    // Queue is [b, c]; b runs first, cedes, and lands behind c.
    sched.schedule();

    assert_eq!(*log.lock(), vec!["b1", "c", "b2"]);
    assert!(!sched.is_ready(b));
    assert_eq!(sched.state(b).unwrap(), ContextState::Dead);
}

#[test]
fn test_schedule_leaves_caller_blocked() {
    let sched = Scheduler::new();
    let main = sched.current();
    let log = new_log();
    let seen = Arc::new(Mutex::new(None));

    let log_b = Arc::clone(&log);
    let seen_b = Arc::clone(&seen);
    let b = sched.create(move |s| {
        // The caller of schedule() arranged nothing, so it must be
        // suspended and out of the queue while we run.
        *seen_b.lock() = Some((s.state(main).unwrap(), s.is_ready(main)));
        push(&log_b, "b");
        s.ready(main).unwrap();
    });
    let log_c = Arc::clone(&log);
    let c = sched.create(move |_| push(&log_c, "c"));

    sched.ready(b).unwrap();
    sched.ready(c).unwrap();
    sched.schedule();

    assert_eq!(*seen.lock(), Some((ContextState::Blocked, false)));
    // b readied main behind c, so c ran before control came back.
    assert_eq!(*log.lock(), vec!["b", "c"]);
}

#[test]
fn test_cede_requeues_before_dispatch() {
    let sched = Scheduler::new();
    let main = sched.current();
    let seen = Arc::new(Mutex::new(None));

    let seen_b = Arc::clone(&seen);
    let b = sched.create(move |s| {
        // A ceding caller is already back in the queue when we run.
        *seen_b.lock() = Some(s.is_ready(main));
    });

    sched.ready(b).unwrap();
    sched.cede();

    assert_eq!(*seen.lock(), Some(true));
}

#[test]
fn test_cede_notself_blocks_until_explicit_ready() {
    let sched = Scheduler::new();
    let log = new_log();

    let log_w = Arc::clone(&log);
    let worker = sched.create(move |s| {
        push(&log_w, "w-start");
        s.cede_notself();
        push(&log_w, "w-end");
    });

    sched.ready(worker).unwrap();
    sched.cede();

    // Worker reached its cede_notself and went blocked; ceding again
    // does not run it.
    assert_eq!(*log.lock(), vec!["w-start"]);
    assert_eq!(sched.state(worker).unwrap(), ContextState::Blocked);
    sched.cede();
    assert_eq!(*log.lock(), vec!["w-start"]);

    // Only an explicit ready resumes it.
    sched.ready(worker).unwrap();
    sched.cede();
    assert_eq!(*log.lock(), vec!["w-start", "w-end"]);
    assert_eq!(sched.state(worker).unwrap(), ContextState::Dead);
}

#[test]
fn test_ready_from_foreign_thread() {
    let sched = Scheduler::new();
    let log = new_log();

    let log_w = Arc::clone(&log);
    let worker = sched.create(move |_| push(&log_w, "w"));

    let remote = sched.clone();
    let handle = std::thread::spawn(move || remote.ready(worker).unwrap());
    handle.join().unwrap();

    assert!(sched.is_ready(worker));
    sched.cede();
    assert_eq!(*log.lock(), vec!["w"]);
}

#[test]
fn test_schedulers_are_independent_universes() {
    fn drive_small_universe() -> (uuid::Uuid, u64) {
        let sched = Scheduler::new();
        let log = new_log();
        for name in ["a", "b"] {
            let log = Arc::clone(&log);
            let ctx = sched.create(move |_| push(&log, name));
            sched.ready(ctx).unwrap();
        }
        sched.cede();
        assert_eq!(*log.lock(), vec!["a", "b"]);
        (sched.instance_id(), sched.stats().dispatches)
    }

    // Two universes on two OS threads, running at the same time.
    let first = std::thread::spawn(drive_small_universe);
    let second = std::thread::spawn(drive_small_universe);
    let (first_id, first_dispatches) = first.join().unwrap();
    let (second_id, second_dispatches) = second.join().unwrap();

    assert_ne!(first_id, second_id);
    assert_eq!(first_dispatches, second_dispatches);

    // A fresh instance on this thread saw none of that traffic.
    let bystander = Scheduler::new();
    assert_eq!(bystander.stats().dispatches, 0);
    assert_eq!(bystander.stats().readies, 0);
    assert_eq!(bystander.ready_count(), 0);
}

#[test]
fn test_trace_sees_lifecycle_in_dispatch_order() {
    let sched = Scheduler::new();
    let main = sched.current();
    let events = Arc::new(Mutex::new(Vec::new()));
    sched.set_trace_sink(Box::new(ForwardingSink(Arc::clone(&events))));

    let worker = ContextBuilder::new()
        .with_name("traced")
        .spawn(&sched, |_| {})
        .unwrap();
    sched.ready(worker).unwrap();
    sched.cede();

    let events = events.lock();
    let actions: Vec<TraceAction> = events.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            TraceAction::Created,
            TraceAction::Readied,  // worker
            TraceAction::Readied,  // main requeued by its cede
            TraceAction::Dispatched,
            TraceAction::Finished,
            TraceAction::Dispatched,
        ]
    );

    assert_eq!(events[0].name.as_deref(), Some("traced"));
    assert_eq!(events[3].ctx, worker);
    assert_eq!(events[3].from, Some(main));
    assert_eq!(events[5].ctx, main);
    assert_eq!(events[5].from, Some(worker));
}
