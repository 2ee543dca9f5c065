//! Mode-dependent chip scheduling.
//!
//! # Cycle-exact step
//!
//! Each cycle:
//! 1. VIC-II: one cycle; on its signal, SID runs one line's worth
//! 2. CIA 1, CIA 2: latch pending IRQs
//! 3. CIA 1, CIA 2: one cycle
//! 4. 6510: one cycle
//! 5. 1541 (if present): count VIA timers, then one cycle unless idle
//! 6. Cycle counter
//!
//! The order is load-bearing: an interrupt line driven by chip N must be
//! visible to chip N+1 within the same cycle.
//!
//! # Line-based step
//!
//! Each raster line:
//! 1. VIC-II: one line, yielding the line's cycle count
//! 2. SID: one line
//! 3. CIA 1, CIA 2: the line's cycles, batched
//! 4. 6510 alone, or 6510 and 1541 interleaved instruction by instruction

use std::ops::ControlFlow;

use emu_core::{Chip, ChipFault, Processor, Ticks};

use crate::chipset::ChipSet;
use crate::run_state::RunState;

/// Which chips take part in a single cycle.
///
/// The full step drives everything; snapshot catch-up replays the same
/// sequence with one or both processors held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lanes {
    pub main_cpu: bool,
    pub drive: bool,
}

impl Lanes {
    pub const ALL: Self = Self {
        main_cpu: true,
        drive: true,
    };
    pub const PERIPHERALS: Self = Self {
        main_cpu: false,
        drive: false,
    };
    pub const WITHOUT_DRIVE: Self = Self {
        main_cpu: true,
        drive: false,
    };
}

/// Work done when the video chip completes a frame.
pub trait FrameHook {
    /// Called once per completed frame, after the cycle or line that
    /// completed it. `Break` makes the cycle loop yield.
    fn frame_complete(&mut self, chips: &mut ChipSet) -> ControlFlow<()>;
}

/// Why the cycle loop yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleExit {
    /// Pause, quit or another state change was requested.
    StateChange,
    /// The frame hook asked to stop at the end of a frame.
    FrameComplete,
}

/// Result of one line-based step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStep {
    /// Processor cycles in the line, as reported by the video chip.
    pub cycles: u32,
    /// The video chip completed a frame on this line.
    pub frame_complete: bool,
}

/// One cycle of the chips selected by `lanes`, in hardware order.
pub(crate) fn advance_cycle(chips: &mut ChipSet, lanes: Lanes) -> Result<(), ChipFault> {
    // 1. Video; its signal marks the end of an audio-sample interval
    if chips.video.step_cycle()? {
        let line = chips.video.cycles_per_line();
        chips.audio.step_line(line)?;
    }

    // 2. Latch interrupts raised during the previous cycle
    chips.timer1.check_irqs();
    chips.timer2.check_irqs();

    // 3. Timers
    chips.timer1.step_cycle()?;
    chips.timer2.step_cycle()?;

    // 4. Main processor
    if lanes.main_cpu {
        chips.cpu.step_cycle()?;
    }

    // 5. Drive
    if lanes.drive {
        if let Some(drive) = chips.drive.as_mut() {
            drive.cpu.count_timers(1);
            if !drive.cpu.is_idle() {
                drive.cpu.step_cycle()?;
            }
        }
    }

    Ok(())
}

/// One full cycle-exact step of the whole chip set.
pub fn step_cycle(chips: &mut ChipSet, counter: &mut Ticks) -> Result<(), ChipFault> {
    advance_cycle(chips, Lanes::ALL)?;

    // 6. Cycle counter
    counter.increment();
    Ok(())
}

/// Run cycle-exact steps until a state change is requested or the frame
/// hook breaks.
///
/// The state-change flag is checked before every cycle and cleared on the
/// way out.
pub fn run_cycles(
    chips: &mut ChipSet,
    run: &RunState,
    counter: &mut Ticks,
    hook: &mut dyn FrameHook,
) -> Result<CycleExit, ChipFault> {
    while !run.state_changed() {
        step_cycle(chips, counter)?;

        if chips.video.take_frame_complete() && hook.frame_complete(chips).is_break() {
            return Ok(CycleExit::FrameComplete);
        }
    }

    run.clear_state_change();
    Ok(CycleExit::StateChange)
}

/// One line-based step.
///
/// With the drive active and busy, the two processors are interleaved one
/// instruction at a time: whichever has more of its line budget left runs
/// next (the drive on a tie), until both budgets are spent.
pub fn step_line(chips: &mut ChipSet, drive_budget: u32) -> Result<LineStep, ChipFault> {
    // 1. Video: one raster line
    let budget = chips.video.cycles_per_line();
    let cycles = chips.video.step_line(budget)?;
    let frame_complete = chips.video.take_frame_complete();

    // 2. Audio
    chips.audio.step_line(cycles)?;

    // 3. Timers, batched
    chips.timer1.step_line(cycles)?;
    chips.timer2.step_line(cycles)?;

    // 4. Processors
    match chips.drive.as_mut() {
        None => {
            chips.cpu.step_line(cycles)?;
        }
        Some(drive) => {
            drive.cpu.count_timers(drive_budget);

            if drive.cpu.is_idle() {
                chips.cpu.step_line(cycles)?;
            } else {
                let mut main_left = i64::from(cycles);
                let mut drive_left = i64::from(drive_budget);
                while main_left > 0 || drive_left > 0 {
                    if main_left > drive_left {
                        main_left -= instruction_cycles("6510", chips.cpu.step_line(1)?)?;
                    } else {
                        drive_left -= instruction_cycles("1541", drive.cpu.step_line(1)?)?;
                    }
                }
            }
        }
    }

    Ok(LineStep {
        cycles,
        frame_complete,
    })
}

/// An instruction that takes no time would stall the interleave forever.
fn instruction_cycles(chip: &'static str, used: u32) -> Result<i64, ChipFault> {
    if used == 0 {
        return Err(ChipFault::new(chip, "instruction consumed no cycles"));
    }
    Ok(i64::from(used))
}
