//! The chip stepping contract.

use crate::{ChipFault, ChipState, StateError};

/// A component whose internal state can be captured and restored.
///
/// Blobs are opaque to everything except the chip that produced them. A
/// chip must reject a blob whose tag or version it does not recognise
/// rather than guessing at its layout.
pub trait Stateful {
    /// Capture the complete internal state.
    fn capture_state(&self) -> ChipState;

    /// Replace the internal state with a previously captured one.
    ///
    /// On error the chip is left in an unspecified state; the owner must
    /// reset it before stepping again.
    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError>;
}

/// A chip that can be advanced by the scheduler.
///
/// Two granularities exist. Cycle-exact scheduling calls `step_cycle` for
/// every chip on every clock cycle; line-based scheduling calls
/// `step_line` once per raster line with a cycle budget.
pub trait Chip: Stateful {
    /// Advance exactly one cycle.
    ///
    /// Returns `true` when the chip raised its output signal during this
    /// cycle. What the signal means is chip-specific (the video chip uses
    /// it to mark the end of an audio-sample interval); chips without one
    /// return `false`.
    fn step_cycle(&mut self) -> Result<bool, ChipFault>;

    /// Advance by roughly `budget` cycles, returning the cycles consumed.
    ///
    /// Video chips complete one raster line. Processors complete whole
    /// instructions, so the result may exceed the budget: an instruction
    /// is never split in line-based mode.
    fn step_line(&mut self, budget: u32) -> Result<u32, ChipFault>;

    /// Hard reset.
    fn reset(&mut self);
}

/// A chip that executes an instruction stream.
pub trait Processor: Chip {
    /// True when no instruction is partially executed.
    ///
    /// Processor state is only mode-independent at an instruction
    /// boundary, so snapshots are aligned on it.
    fn is_instruction_boundary(&self) -> bool;

    /// True when the processor is halted or clock-gated.
    ///
    /// An idle processor is not stepped. The drive processor goes idle
    /// while no disk activity is pending.
    fn is_idle(&self) -> bool {
        false
    }
}
