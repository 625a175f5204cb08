//! Scheduling trace sinks.
//!
//! Optional event stream recording context lifecycle and dispatch decisions,
//! for diagnostics and for tests asserting orderings.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::context::ContextId;
use crate::util::clock::now_ms;

/// What a trace event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    /// A context was registered.
    Created,
    /// A context was newly enqueued on the ready queue.
    Readied,
    /// A context was popped (or directly targeted) and resumed.
    Dispatched,
    /// A context finished and went dead.
    Finished,
}

/// One scheduling event.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// What happened.
    pub action: TraceAction,
    /// The context the event is about (the resumed side for dispatches).
    pub ctx: ContextId,
    /// The suspended side of a dispatch, if the event has one.
    pub from: Option<ContextId>,
    /// Context name, when one was assigned at creation.
    pub name: Option<String>,
    /// Timestamp in milliseconds since epoch.
    pub at_ms: u128,
}

/// Trace sink abstraction.
pub trait TraceSink: Send {
    /// Record a scheduling event.
    fn record(&mut self, event: TraceEvent);
}

/// In-memory trace sink with a bounded buffer, for testing and dev.
pub struct InMemoryTraceSink {
    events: VecDeque<TraceEvent>,
    max_events: usize,
}

impl InMemoryTraceSink {
    /// Create a sink keeping at most `max_events` entries, oldest dropped first.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Snapshot of the stored events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.iter().cloned().collect()
    }
}

impl TraceSink for InMemoryTraceSink {
    fn record(&mut self, event: TraceEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Build a trace event stamped with the current wall clock.
#[must_use]
pub fn build_trace_event(
    action: TraceAction,
    ctx: ContextId,
    from: Option<ContextId>,
    name: Option<String>,
) -> TraceEvent {
    TraceEvent {
        action,
        ctx,
        from,
        name,
        at_ms: now_ms(),
    }
}
