//! Per-context environment bundle and the save mask selecting what a
//! transfer carries.

use std::mem;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Selects which environment slots the transfer engine saves and restores
    /// on every context switch, plus the stack materialization toggle.
    ///
    /// Slots left out of the mask are not switched: whatever the outgoing
    /// context left in them is visible to the incoming one. Narrowing the mask
    /// trades that leakage for cheaper switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SaveMask: u8 {
        /// Output target slot.
        const OUTPUT = 1 << 0;
        /// Input source slot.
        const INPUT = 1 << 1;
        /// Last-error slot.
        const LAST_ERROR = 1 << 2;
        /// Nested-call marker slot.
        const CALL_MARKER = 1 << 3;
        /// Defer stack materialization until a context first runs.
        const LAZY_STACK = 1 << 4;
    }
}

impl SaveMask {
    /// The four environment slots, without the stack toggle.
    #[must_use]
    pub const fn env_slots() -> Self {
        Self::OUTPUT
            .union(Self::INPUT)
            .union(Self::LAST_ERROR)
            .union(Self::CALL_MARKER)
    }
}

impl Default for SaveMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Where a context's implicit output or input is directed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoTarget {
    /// The process-default stream.
    #[default]
    Standard,
    /// Discard writes / yield nothing on reads.
    Null,
    /// A named target resolved by the embedding application.
    Named(String),
}

/// The implicit state a coroutine sees: output and input targets, the
/// last-error slot, and the nested-call marker.
///
/// One live bundle exists per scheduler and always belongs to the running
/// context; each suspended context holds the copy saved at its last switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvBundle {
    /// Output target slot.
    pub output: IoTarget,
    /// Input source slot.
    pub input: IoTarget,
    /// Last error recorded by the context, if any.
    pub last_error: Option<String>,
    /// Marker tracking nested host-call depth.
    pub call_marker: u64,
}

impl EnvBundle {
    /// Swap the slots selected by `mask` between this saved bundle and the
    /// live one. Unselected slots are left untouched on both sides.
    pub fn swap_selected(&mut self, live: &mut Self, mask: SaveMask) {
        if mask.contains(SaveMask::OUTPUT) {
            mem::swap(&mut self.output, &mut live.output);
        }
        if mask.contains(SaveMask::INPUT) {
            mem::swap(&mut self.input, &mut live.input);
        }
        if mask.contains(SaveMask::LAST_ERROR) {
            mem::swap(&mut self.last_error, &mut live.last_error);
        }
        if mask.contains(SaveMask::CALL_MARKER) {
            mem::swap(&mut self.call_marker, &mut live.call_marker);
        }
    }
}
