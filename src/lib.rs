//! # Cedence
//!
//! A cooperative coroutine scheduling core with explicit yield primitives and
//! a versioned capability surface.
//!
//! Cedence manages a universe of contexts that hand control to each other
//! explicitly. Nothing is preempted and nothing runs in parallel within one
//! scheduler: exactly one context executes at any instant, and it keeps the
//! CPU until it cedes, schedules away, or finishes. Fairness, critical
//! sections, and wakeup ordering are therefore program logic, not runtime
//! policy.
//!
//! ## Scheduling Model
//!
//! - **FIFO ready queue**: `ready` marks a context runnable and appends it;
//!   dispatch always pops the head. A context is in the queue iff it is
//!   runnable and not current.
//! - **Explicit yields**: [`cede`](core::Scheduler::cede) stays runnable,
//!   [`cede_notself`](core::Scheduler::cede_notself) blocks until re-readied,
//!   [`schedule`](core::Scheduler::schedule) dispatches without requeueing
//!   the caller.
//! - **Cooperative deadlock is fatal**: dispatching from an empty ready
//!   queue means nothing can ever run again, and the scheduler says so by
//!   panicking rather than idling.
//! - **Carrier threads as stacks**: each context owns a parked OS thread, so
//!   switches are safe Rust handoffs rather than stack surgery. Stacks
//!   materialize lazily on first dispatch by default.
//!
//! ## Key Features
//!
//! - **Generation-checked handles**: context ids survive slot reuse; a stale
//!   handle is an error, never a confusion of identities.
//! - **Schedule-like operations**: the [`ScheduleLike`](core::ScheduleLike)
//!   protocol lets blocking primitives take an inline fast path and register
//!   waiters only when they actually suspend. [`Semaphore`](semaphore::Semaphore)
//!   is the canonical consumer.
//! - **Environment bundles**: per-context output/input/error/marker slots
//!   saved and restored across switches under a configurable mask.
//! - **Ready hook**: bridge wakeups to an external event loop without giving
//!   up control of dispatch.
//! - **Capability binding**: embedders declare the API revision they were
//!   built against and fail loudly on mismatch.
//!
//! ```rust,ignore
//! use cedence::core::Scheduler;
//!
//! let sched = Scheduler::new();
//! let worker = sched.create(|s| {
//!     // Runs once dispatched to; cede hands control back while
//!     // staying runnable.
//!     s.cede();
//! });
//! sched.ready(worker)?;
//! sched.cede(); // worker runs to its cede, then we resume here
//! sched.cede(); // worker finishes
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_loop_test.rs` - Queue discipline and yield primitives
//! - `tests/slf_protocol_test.rs` - Schedule-like operations end to end

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling machinery: contexts, queue, transfers, and protocol.
pub mod core;
/// Configuration models for scheduler instances.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Versioned capability surface for embedders.
pub mod capability;
/// Counting semaphore built on schedule-like operations.
pub mod semaphore;
/// Shared utilities.
pub mod util;
