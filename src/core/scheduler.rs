//! The scheduler: context registry, ready queue, and yield primitives.
//!
//! One [`Scheduler`] instance owns one cooperative universe. Each context is
//! carried by a dedicated OS thread whose native stack is the context's own;
//! carriers are serialized by per-context gates so at most one context in the
//! universe executes at any instant. Handles are cheaply cloneable and may be
//! shared with foreign threads for `ready`-side operations, but the yield
//! primitives may only be driven by the thread carrying the running context.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::context::{ContextId, ContextState, Readiness};
use crate::core::env::{EnvBundle, IoTarget, SaveMask};
use crate::core::error::SchedError;
use crate::core::queue::ReadyQueue;
use crate::core::slf::{ScheduleLike, SlfInit, SlfRequest};
use crate::core::trace::{build_trace_event, TraceAction, TraceSink};
use crate::core::transfer::{Gate, TransferArgs};

thread_local! {
    /// Set while a ready hook or an SLF `prepare` runs on this thread.
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

pub(crate) type Entry = Box<dyn FnOnce(&Scheduler) + Send + 'static>;
type SharedSink = Arc<Mutex<Box<dyn TraceSink>>>;
type ReadyHook = Arc<dyn Fn() + Send + Sync>;

/// Counter snapshot for one scheduler instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedStats {
    /// Contexts newly enqueued by `ready`, including cede self-requeues.
    pub readies: u64,
    /// Queue pops that selected the next context to run.
    pub dispatches: u64,
    /// Context switches actually performed. A cede that dispatches back to
    /// its own caller switches nothing and is not counted here.
    pub transfers: u64,
    /// Carrier threads spawned, i.e. stacks materialized.
    pub stacks_spawned: u64,
}

/// What happens to the calling context when it hands control away.
#[derive(Debug, Clone, Copy)]
enum Disposition {
    /// Re-enqueue the caller at the tail: it stays runnable.
    Requeue,
    /// Mark the caller blocked: it waits for an explicit `ready`.
    Block,
    /// Mark the caller blocked without requeueing it, under the `schedule`
    /// diagnostic name. Distinct from [`Block`](Self::Block) only in which
    /// primitive the deadlock panic reports.
    Leave,
}

/// Creation options carried from [`ContextBuilder`](crate::builders::ContextBuilder).
#[derive(Debug, Default, Clone)]
pub(crate) struct CreateOpts {
    pub(crate) name: Option<String>,
    pub(crate) stack_size: Option<usize>,
    pub(crate) eager: bool,
}

/// One entry in the context table.
struct Slot {
    generation: u32,
    state: ContextState,
    gate: Arc<Gate>,
    entry: Option<Entry>,
    /// Carrier thread once the stack is materialized.
    carrier: Option<ThreadId>,
    name: Option<String>,
    stack_size: Option<usize>,
    saved_env: EnvBundle,
}

impl Slot {
    fn fresh(generation: u32, opts: CreateOpts, entry: Entry) -> Self {
        Self {
            generation,
            state: ContextState::Fresh,
            gate: Arc::new(Gate::new()),
            entry: Some(entry),
            carrier: None,
            name: opts.name,
            stack_size: opts.stack_size,
            saved_env: EnvBundle::default(),
        }
    }
}

/// Registry state behind the instance mutex.
struct SchedCore {
    slots: Vec<Slot>,
    free: Vec<usize>,
    queue: ReadyQueue,
    current: ContextId,
    /// Live environment bundle, owned by the running context.
    env: EnvBundle,
    save: SaveMask,
    default_stack: Option<usize>,
    /// True between the start of a switch and its finalization.
    switching: bool,
    hook: Option<ReadyHook>,
    sink: Option<SharedSink>,
}

impl SchedCore {
    fn resolve(&self, ctx: ContextId) -> Result<usize, SchedError> {
        let idx = ctx.slot();
        match self.slots.get(idx) {
            Some(slot) if slot.generation == ctx.generation() => Ok(idx),
            _ => Err(SchedError::UnknownContext(ctx)),
        }
    }
}

struct SchedInner {
    core: Mutex<SchedCore>,
    readies: AtomicU64,
    dispatches: AtomicU64,
    transfers: AtomicU64,
    stacks_spawned: AtomicU64,
    instance: Uuid,
}

/// Clears the in-progress marker if a switch unwinds before finalizing.
struct SwitchLatch<'a> {
    inner: &'a SchedInner,
    armed: bool,
}

impl Drop for SwitchLatch<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.core.lock().switching = false;
        }
    }
}

/// Restores the per-thread callback marker on scope exit, nesting-safe.
struct CallbackGuard {
    prev: bool,
}

impl CallbackGuard {
    fn enter() -> Self {
        let prev = IN_CALLBACK.with(|flag| flag.replace(true));
        Self { prev }
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        IN_CALLBACK.with(|flag| flag.set(self.prev));
    }
}

/// Handle to one cooperative scheduling universe.
///
/// Cloning is cheap and shares the instance. The thread that creates the
/// scheduler becomes the *main* context; further contexts are registered with
/// [`create`](Self::create) or a [`ContextBuilder`](crate::builders::ContextBuilder)
/// and run when dispatched to, never concurrently.
///
/// Suspended contexts keep their carrier threads parked; those carriers hold
/// the instance alive, so a universe abandoned mid-flight stays parked until
/// the process exits. Drive every context to completion before letting the
/// last user handle go.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("instance", &self.inner.instance)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler with the default configuration, registering the
    /// calling thread as the running main context.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }

    /// Create a scheduler from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::Config`] when validation rejects the values.
    pub fn with_config(config: &SchedulerConfig) -> Result<Self, SchedError> {
        config.validate().map_err(SchedError::Config)?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: &SchedulerConfig) -> Self {
        let main = Slot {
            generation: 0,
            state: ContextState::Running,
            gate: Arc::new(Gate::new()),
            entry: None,
            carrier: Some(thread::current().id()),
            name: Some("main".into()),
            stack_size: None,
            saved_env: EnvBundle::default(),
        };
        let inner = SchedInner {
            core: Mutex::new(SchedCore {
                slots: vec![main],
                free: Vec::new(),
                queue: ReadyQueue::new(),
                current: ContextId::new(0, 0),
                env: EnvBundle::default(),
                save: config.save_mask(),
                default_stack: config.default_stack_size_kib.map(|kib| kib * 1024),
                switching: false,
                hook: None,
                sink: None,
            }),
            readies: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            stacks_spawned: AtomicU64::new(0),
            instance: Uuid::new_v4(),
        };
        tracing::debug!("scheduler {} initialized", inner.instance);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Unique id of this instance, for correlating logs across schedulers.
    #[must_use]
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance
    }

    /// Register a new context running `entry` on its own stack.
    ///
    /// The context starts `fresh` and does not run until dispatched to. With
    /// the default configuration its stack is materialized lazily, on the
    /// first dispatch into it.
    ///
    /// # Panics
    ///
    /// Panics if the configuration demands eager stacks and the carrier
    /// thread cannot be spawned. Use
    /// [`ContextBuilder::spawn`](crate::builders::ContextBuilder::spawn) to
    /// handle that failure instead.
    pub fn create<F>(&self, entry: F) -> ContextId
    where
        F: FnOnce(&Scheduler) + Send + 'static,
    {
        match self.spawn_context(CreateOpts::default(), Box::new(entry)) {
            Ok(id) => id,
            Err(e) => panic!("context creation failed: {e}"),
        }
    }

    pub(crate) fn spawn_context(
        &self,
        opts: CreateOpts,
        entry: Entry,
    ) -> Result<ContextId, SchedError> {
        let eager = opts.eager;
        let mut core = self.inner.core.lock();
        let eager = eager || !core.save.contains(SaveMask::LAZY_STACK);
        let idx = if let Some(idx) = core.free.pop() {
            let generation = core.slots[idx].generation.wrapping_add(1);
            core.slots[idx] = Slot::fresh(generation, opts, entry);
            idx
        } else {
            core.slots.push(Slot::fresh(0, opts, entry));
            core.slots.len() - 1
        };
        let id = ContextId::new(idx as u32, core.slots[idx].generation);
        if eager {
            if let Err(e) = self.materialize(&mut core, idx) {
                // Roll the slot back for reuse; no handle to it escapes.
                core.slots[idx].state = ContextState::Dead;
                core.free.push(idx);
                return Err(e);
            }
        }
        let name = core.slots[idx].name.clone();
        let sink = core.sink.clone();
        drop(core);

        tracing::debug!("created context {id}");
        record_trace(sink.as_ref(), TraceAction::Created, id, None, name);
        Ok(id)
    }

    /// Spawn the carrier thread for a fresh context. Its first act is to park
    /// on the context gate, so spawning under the registry lock cannot wedge.
    fn materialize(&self, core: &mut SchedCore, idx: usize) -> Result<(), SchedError> {
        let default_stack = core.default_stack;
        let slot = &mut core.slots[idx];
        let id = ContextId::new(idx as u32, slot.generation);
        let Some(entry) = slot.entry.take() else {
            panic!("context {id} has no entry closure left to run");
        };
        let gate = Arc::clone(&slot.gate);
        let mut builder = thread::Builder::new()
            .name(slot.name.clone().unwrap_or_else(|| format!("cedence-{id}")));
        if let Some(bytes) = slot.stack_size.or(default_stack) {
            builder = builder.stack_size(bytes);
        }
        let sched = self.clone();
        let handle = builder.spawn(move || carrier_main(&sched, &gate, entry))?;
        slot.carrier = Some(handle.thread().id());
        self.inner.stacks_spawned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("materialized stack for {id}");
        Ok(())
    }

    /// Mark a context runnable and append it to the ready queue.
    ///
    /// Returns [`Readiness::AlreadyReady`] without touching the queue when
    /// the context is the current one or already queued; readying is
    /// idempotent. Newly enqueueing fires the ready hook exactly once, after
    /// the queue edit and with the registry unlocked.
    ///
    /// May be called from any thread, including ones foreign to this
    /// scheduler, which is how external event sources inject wakeups.
    ///
    /// # Errors
    ///
    /// [`SchedError::DeadContext`] if the context finished already, or
    /// [`SchedError::UnknownContext`] if the handle is stale.
    pub fn ready(&self, ctx: ContextId) -> Result<Readiness, SchedError> {
        let mut core = self.inner.core.lock();
        let idx = core.resolve(ctx)?;
        match core.slots[idx].state {
            ContextState::Dead => Err(SchedError::DeadContext(ctx)),
            ContextState::Running | ContextState::Ready => Ok(Readiness::AlreadyReady),
            ContextState::Fresh | ContextState::Blocked => {
                core.slots[idx].state = ContextState::Ready;
                core.queue.push(ctx);
                self.inner.readies.fetch_add(1, Ordering::Relaxed);
                let hook = core.hook.clone();
                let sink = core.sink.clone();
                drop(core);

                tracing::debug!("readied {ctx}");
                record_trace(sink.as_ref(), TraceAction::Readied, ctx, None, None);
                fire_hook(hook);
                Ok(Readiness::NewlyEnqueued)
            }
        }
    }

    /// True iff the context is queued runnable right now. Stale and dead
    /// handles answer `false`.
    #[must_use]
    pub fn is_ready(&self, ctx: ContextId) -> bool {
        let core = self.inner.core.lock();
        core.resolve(ctx)
            .is_ok_and(|idx| core.slots[idx].state == ContextState::Ready)
    }

    /// Current lifecycle state of a context.
    ///
    /// # Errors
    ///
    /// [`SchedError::UnknownContext`] if the handle is stale.
    pub fn state(&self, ctx: ContextId) -> Result<ContextState, SchedError> {
        let core = self.inner.core.lock();
        let idx = core.resolve(ctx)?;
        Ok(core.slots[idx].state)
    }

    /// Handle of the context currently holding control.
    #[must_use]
    pub fn current(&self) -> ContextId {
        self.inner.core.lock().current
    }

    /// Number of contexts queued runnable, O(1).
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.inner.core.lock().queue.len()
    }

    /// Snapshot of the ready queue in dispatch order.
    #[must_use]
    pub fn ready_order(&self) -> Vec<ContextId> {
        self.inner.core.lock().queue.snapshot()
    }

    /// The environment slots transfers save and restore, plus the lazy-stack
    /// toggle. Fixed at construction.
    #[must_use]
    pub fn save_mask(&self) -> SaveMask {
        self.inner.core.lock().save
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedStats {
        SchedStats {
            readies: self.inner.readies.load(Ordering::Relaxed),
            dispatches: self.inner.dispatches.load(Ordering::Relaxed),
            transfers: self.inner.transfers.load(Ordering::Relaxed),
            stacks_spawned: self.inner.stacks_spawned.load(Ordering::Relaxed),
        }
    }

    /// Install the ready hook, replacing any previous one.
    ///
    /// The hook runs synchronously whenever `ready` newly enqueues a context,
    /// on whichever thread called `ready`. It must not call back into a yield
    /// primitive; doing so aborts with a diagnostic.
    pub fn set_ready_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.core.lock().hook = Some(Arc::new(hook));
    }

    /// Remove the ready hook. Readying without a hook is a plain queue edit.
    pub fn clear_ready_hook(&self) {
        self.inner.core.lock().hook = None;
    }

    /// Install a trace sink receiving scheduling events.
    pub fn set_trace_sink(&self, sink: Box<dyn TraceSink>) {
        self.inner.core.lock().sink = Some(Arc::new(Mutex::new(sink)));
    }

    /// Output target slot of the live environment bundle.
    #[must_use]
    pub fn output_target(&self) -> IoTarget {
        self.inner.core.lock().env.output.clone()
    }

    /// Redirect the running context's output target.
    pub fn set_output_target(&self, target: IoTarget) {
        self.inner.core.lock().env.output = target;
    }

    /// Input source slot of the live environment bundle.
    #[must_use]
    pub fn input_source(&self) -> IoTarget {
        self.inner.core.lock().env.input.clone()
    }

    /// Redirect the running context's input source.
    pub fn set_input_source(&self, source: IoTarget) {
        self.inner.core.lock().env.input = source;
    }

    /// Last error recorded in the live environment bundle.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.core.lock().env.last_error.clone()
    }

    /// Set or clear the running context's last-error slot.
    pub fn set_last_error(&self, error: Option<String>) {
        self.inner.core.lock().env.last_error = error;
    }

    /// Nested-call marker of the live environment bundle.
    #[must_use]
    pub fn call_marker(&self) -> u64 {
        self.inner.core.lock().env.call_marker
    }

    /// Set the running context's nested-call marker.
    pub fn set_call_marker(&self, marker: u64) {
        self.inner.core.lock().env.call_marker = marker;
    }

    /// Yield while staying runnable: requeue the caller at the tail, then
    /// dispatch. The caller resumes once it reaches the queue head again; if
    /// nothing else is ready it resumes immediately without a switch.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that does not carry the running
    /// context, or from inside a ready hook or SLF `prepare`.
    pub fn cede(&self) {
        self.dispatch(Disposition::Requeue, None);
    }

    /// Yield without staying runnable: the caller blocks and runs again only
    /// after some other context calls [`ready`](Self::ready) on it.
    ///
    /// # Panics
    ///
    /// Panics on an empty ready queue (cooperative deadlock), from a foreign
    /// thread, or from inside a ready hook or SLF `prepare`.
    pub fn cede_notself(&self) {
        self.dispatch(Disposition::Block, None);
    }

    /// Dispatch the queue head without requeueing the caller.
    ///
    /// The caller is marked blocked before any switch work begins, so a
    /// wakeup racing the suspension (an SLF `prepare` registering interest,
    /// a foreign thread) enqueues it rather than being lost. There is no
    /// implicit idle wait: something must already be ready.
    ///
    /// # Panics
    ///
    /// Panics on an empty ready queue (cooperative deadlock), from a foreign
    /// thread, or from inside a ready hook or SLF `prepare`.
    pub fn schedule(&self) {
        self.dispatch(Disposition::Leave, None);
    }

    /// Run one logical call of a schedule-like operation.
    ///
    /// `init` deciding [`SlfInit::Immediate`] returns on the spot, with no
    /// queue traffic and no switch. Otherwise the prepare/transfer/check
    /// cycle runs, repeating while `check` answers `true`, and the result
    /// comes from `take_result`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as the primitive the operation
    /// requested.
    pub fn run_slf<S: ScheduleLike>(&self, mut op: S) -> S::Output {
        match op.init(self) {
            SlfInit::Immediate(result) => result,
            SlfInit::Suspend(request) => {
                let disposition = match request {
                    SlfRequest::Schedule => Disposition::Leave,
                    SlfRequest::Cede => Disposition::Requeue,
                    SlfRequest::CedeNotself => Disposition::Block,
                };
                loop {
                    let mut prepare =
                        |sched: &Scheduler, args: &TransferArgs| op.prepare(sched, args);
                    self.dispatch(disposition, Some(&mut prepare));
                    if !op.check(self) {
                        break;
                    }
                }
                op.take_result()
            }
        }
    }

    /// Switch directly to a specific context, bypassing FIFO order.
    ///
    /// A ready target is removed from the queue so it cannot be dispatched
    /// twice. The caller is left blocked and resumes only when something
    /// calls [`ready`](Self::ready) for it. Transferring to the current
    /// context is a no-op.
    ///
    /// # Panics
    ///
    /// Panics on a dead or stale target, from a foreign thread, or from
    /// inside a ready hook or SLF `prepare`.
    pub fn transfer_to(&self, next: ContextId) {
        self.assert_not_in_callback("transfer_to");
        let mut latch = SwitchLatch {
            inner: &self.inner,
            armed: false,
        };
        let mut core = self.inner.core.lock();
        let prev = core.current;
        assert_caller_carries(&core, prev, self.inner.instance);
        if next == prev {
            return;
        }
        let Ok(nidx) = core.resolve(next) else {
            panic!("transfer target {next} is not a registered context");
        };
        if core.slots[nidx].state == ContextState::Dead {
            panic!("transfer into dead context {next}");
        }
        if core.switching {
            panic!(
                "transfer already in progress on scheduler {}",
                self.inner.instance
            );
        }
        core.switching = true;
        latch.armed = true;

        if core.slots[nidx].state == ContextState::Ready {
            core.queue.remove(next);
        }
        self.finalize_switch(&mut core, prev, next);
        latch.armed = false;
        self.handoff(core, prev, next);
    }

    /// One dispatch: settle the caller's disposition, pop the queue head,
    /// and switch to it.
    fn dispatch(
        &self,
        disposition: Disposition,
        mut prepare: Option<&mut dyn FnMut(&Scheduler, &TransferArgs)>,
    ) {
        let primitive = match disposition {
            Disposition::Requeue => "cede",
            Disposition::Block => "cede_notself",
            Disposition::Leave => "schedule",
        };
        self.assert_not_in_callback(primitive);

        let mut latch = SwitchLatch {
            inner: &self.inner,
            armed: false,
        };
        let mut core = self.inner.core.lock();
        let prev = core.current;
        assert_caller_carries(&core, prev, self.inner.instance);
        if core.switching {
            panic!(
                "transfer already in progress on scheduler {}",
                self.inner.instance
            );
        }
        core.switching = true;
        latch.armed = true;

        match disposition {
            Disposition::Requeue => {
                core.slots[prev.slot()].state = ContextState::Ready;
                core.queue.push(prev);
                self.inner.readies.fetch_add(1, Ordering::Relaxed);
                let hook = core.hook.clone();
                let sink = core.sink.clone();
                drop(core);

                record_trace(sink.as_ref(), TraceAction::Readied, prev, None, None);
                fire_hook(hook);
                core = self.inner.core.lock();
            }
            // Settled before the lock drops for `prepare`: a wakeup landing
            // in that window must find the caller Blocked, not still Running,
            // or ready() answers AlreadyReady and the wakeup is lost.
            Disposition::Block | Disposition::Leave => {
                core.slots[prev.slot()].state = ContextState::Blocked;
            }
        }

        let Some(next) = core.queue.pop() else {
            panic!(
                "{primitive}() with an empty ready queue: cooperative deadlock, \
                 nothing can ever run again"
            );
        };
        self.inner.dispatches.fetch_add(1, Ordering::Relaxed);

        if next == prev {
            // Only reachable from cede when nothing else was ready.
            core.slots[prev.slot()].state = ContextState::Running;
            core.switching = false;
            latch.armed = false;
            return;
        }

        if let Some(prepare) = prepare.as_mut() {
            let args = TransferArgs { prev, next };
            drop(core);
            {
                let _guard = CallbackGuard::enter();
                prepare(self, &args);
            }
            core = self.inner.core.lock();
        }

        self.finalize_switch(&mut core, prev, next);
        latch.armed = false;
        self.handoff(core, prev, next);
    }

    /// Commit the switch bookkeeping: states, current pointer, environment
    /// bundle swap per the save mask.
    fn finalize_switch(&self, core: &mut SchedCore, prev: ContextId, next: ContextId) {
        let pidx = prev.slot();
        let nidx = next.slot();
        // Only transfer_to still arrives here with a Running prev; dispatch
        // and retire settle the caller before any lock is dropped.
        if core.slots[pidx].state == ContextState::Running {
            core.slots[pidx].state = ContextState::Blocked;
        }
        core.slots[nidx].state = ContextState::Running;
        core.current = next;

        {
            let SchedCore {
                slots, env, save, ..
            } = &mut *core;
            // Park the live slots into the suspending side, then pull the
            // resuming side's saved slots in. The values this leaves behind
            // in prev's bundle are dead storage until prev is next saved.
            slots[pidx].saved_env.swap_selected(env, *save);
            slots[nidx].saved_env.swap_selected(env, *save);
        }

        core.switching = false;
        self.inner.transfers.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("transfer {prev} -> {next}");
    }

    /// Release the registry, wake the target carrier, park the caller.
    fn handoff(
        &self,
        mut core: parking_lot::MutexGuard<'_, SchedCore>,
        prev: ContextId,
        next: ContextId,
    ) {
        let nidx = next.slot();
        if core.slots[nidx].carrier.is_none() {
            if let Err(e) = self.materialize(&mut core, nidx) {
                panic!("failed to materialize stack for {next}: {e}");
            }
        }
        let next_gate = Arc::clone(&core.slots[nidx].gate);
        let prev_gate = Arc::clone(&core.slots[prev.slot()].gate);
        let sink = core.sink.clone();
        drop(core);

        record_trace(sink.as_ref(), TraceAction::Dispatched, next, Some(prev), None);
        next_gate.open();
        prev_gate.wait();
    }

    /// Death of the running context: mark it dead, recycle its slot, and hand
    /// control to the queue head. Runs on the dying carrier, which exits
    /// afterwards.
    fn retire_current(&self) {
        let mut core = self.inner.core.lock();
        let prev = core.current;
        let pidx = prev.slot();
        // A context that died inside a cede (its hook panicked, say) may
        // still sit in the queue; a dead entry must never be dispatched.
        if core.slots[pidx].state == ContextState::Ready {
            core.queue.remove(prev);
        }
        core.slots[pidx].state = ContextState::Dead;
        core.slots[pidx].carrier = None;
        core.slots[pidx].entry = None;
        core.free.push(pidx);

        let Some(next) = core.queue.pop() else {
            tracing::error!(
                "context {prev} finished with nothing ready: the cooperative \
                 universe is empty and every suspended context is unreachable"
            );
            std::process::abort();
        };
        debug_assert_ne!(next, prev);
        self.inner.dispatches.fetch_add(1, Ordering::Relaxed);
        self.finalize_switch(&mut core, prev, next);

        let nidx = next.slot();
        if core.slots[nidx].carrier.is_none() {
            if let Err(e) = self.materialize(&mut core, nidx) {
                panic!("failed to materialize stack for {next}: {e}");
            }
        }
        let next_gate = Arc::clone(&core.slots[nidx].gate);
        let sink = core.sink.clone();
        drop(core);

        tracing::debug!("context {prev} finished");
        record_trace(sink.as_ref(), TraceAction::Finished, prev, None, None);
        record_trace(sink.as_ref(), TraceAction::Dispatched, next, Some(prev), None);
        next_gate.open();
    }

    fn assert_not_in_callback(&self, primitive: &str) {
        if IN_CALLBACK.with(Cell::get) {
            panic!(
                "{primitive} invoked from inside a ready hook or SLF prepare; \
                 callbacks must not re-enter the scheduler"
            );
        }
    }
}

/// Body of every carrier thread: park until first dispatched to, run the
/// entry closure, then retire. A panicking entry is contained and logged; the
/// context dies either way.
fn carrier_main(sched: &Scheduler, gate: &Gate, entry: Entry) {
    gate.wait();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(sched)));
    if let Err(payload) = outcome {
        let msg = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        tracing::error!("context {} panicked: {msg}", sched.current());
    }
    sched.retire_current();
}

fn assert_caller_carries(core: &SchedCore, current: ContextId, instance: Uuid) {
    if core.slots[current.slot()].carrier != Some(thread::current().id()) {
        panic!(
            "scheduler {instance} driven from a foreign thread: running \
             context {current} is carried elsewhere"
        );
    }
}

fn fire_hook(hook: Option<ReadyHook>) {
    if let Some(hook) = hook {
        let _guard = CallbackGuard::enter();
        hook();
    }
}

fn record_trace(
    sink: Option<&SharedSink>,
    action: TraceAction,
    ctx: ContextId,
    from: Option<ContextId>,
    name: Option<String>,
) {
    if let Some(sink) = sink {
        sink.lock().record(build_trace_event(action, ctx, from, name));
    }
}
