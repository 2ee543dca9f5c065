//! C64 chip roles and the factory that builds them.
//!
//! Chip internals (registers, timers, instruction sets) live outside this
//! crate. Each role below adds to [`emu_core::Chip`] only what the
//! scheduler, reconciler and orchestrator need to see.
//!
//! | Role           | C64 part   | Extra contract                         |
//! |----------------|------------|----------------------------------------|
//! | `VideoChip`    | VIC-II     | frame-complete latch, back buffer      |
//! | `AudioChip`    | SID        | sound pause/resume                     |
//! | `TimerChip`    | CIA 1/2    | IRQ latching, TOD at vertical blank    |
//! | `MainProcessor`| 6510       | NMI                                    |
//! | `DriveProcessor`| 1541 6502 | VIA timers counted separately          |
//! | `DiskJob`      | 1541 GCR   | state only                             |
//! | `SerialBus`    | IEC        | reset only                             |

use emu_core::{Chip, InterruptLine, Processor, Stateful};

use crate::config::EmuConfig;
use crate::error::Result;
use crate::handoff::FrameFormat;

/// The video chip.
pub trait VideoChip: Chip + Send {
    /// True once per completed frame; reading clears the latch.
    fn take_frame_complete(&mut self) -> bool;

    /// The buffer the chip draws into, `frame_format().size()` bytes.
    ///
    /// With a display attached, the buffer is exchanged for a spare one of
    /// the same size at the end of every drawn frame. The chip draws into
    /// whichever buffer it holds and never resizes it.
    fn frame_buffer(&mut self) -> &mut Vec<u8>;

    /// Framebuffer dimensions.
    fn frame_format(&self) -> FrameFormat;

    /// Processor cycles in one raster line.
    fn cycles_per_line(&self) -> u32;

    fn apply_config(&mut self, _config: &EmuConfig) {}
}

/// The audio chip.
pub trait AudioChip: Chip + Send {
    fn pause_sound(&mut self) {}

    fn resume_sound(&mut self) {}

    fn apply_config(&mut self, _config: &EmuConfig) {}
}

/// A timer/interrupt chip.
pub trait TimerChip: Chip + Send {
    /// Latch pending interrupt conditions onto the interrupt lines.
    fn check_irqs(&mut self);

    /// Advance the time-of-day clock; called once per vertical blank.
    fn count_tod(&mut self) {}
}

/// The main processor.
pub trait MainProcessor: Processor + Send {
    /// Trigger a non-maskable interrupt (RESTORE key).
    fn nmi(&mut self);
}

/// The drive processor.
pub trait DriveProcessor: Processor + Send {
    /// Advance the drive's VIA timers by `cycles`, independently of
    /// instruction execution.
    fn count_timers(&mut self, cycles: u32);

    fn apply_config(&mut self, _config: &EmuConfig) {}
}

/// The drive's disk-job processor. Not an instruction stream, so it is
/// never stepped by the scheduler.
pub trait DiskJob: Stateful + Send {
    fn apply_config(&mut self, _config: &EmuConfig) {}
}

/// The serial peripheral bus controller.
pub trait SerialBus: Send {
    fn reset(&mut self);

    fn apply_config(&mut self, _config: &EmuConfig) {}
}

/// Which of the two timer chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerId {
    /// CIA 1: keyboard, joystick, timers to IRQ.
    Cia1,
    /// CIA 2: VIC bank, serial bus, timers to NMI.
    Cia2,
}

/// Capability handles shared between chips, created once per chip set.
///
/// A chip keeps the handles it legitimately needs; nothing else about
/// another chip is reachable from it.
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    /// Main processor IRQ input (video chip, CIA 1).
    pub irq: InterruptLine,
    /// Main processor NMI input (CIA 2, RESTORE).
    pub nmi: InterruptLine,
    /// Drive processor IRQ input (drive VIAs).
    pub drive_irq: InterruptLine,
}

impl Wiring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every asserted source.
    pub fn clear(&self) {
        self.irq.clear();
        self.nmi.clear();
        self.drive_irq.clear();
    }
}

/// The drive: processor plus disk-job processor, created and dropped
/// together.
pub struct DriveUnit {
    pub cpu: Box<dyn DriveProcessor>,
    pub job: Box<dyn DiskJob>,
}

/// Builds chips for a chip set.
///
/// Fails with [`crate::Error::Configuration`] when a chip's resources
/// (ROM images, disk image) are missing or invalid.
pub trait ChipFactory: Send {
    fn video(&self, wiring: &Wiring, config: &EmuConfig) -> Result<Box<dyn VideoChip>>;

    fn audio(&self, wiring: &Wiring, config: &EmuConfig) -> Result<Box<dyn AudioChip>>;

    fn timer(
        &self,
        which: TimerId,
        wiring: &Wiring,
        config: &EmuConfig,
    ) -> Result<Box<dyn TimerChip>>;

    fn main_processor(
        &self,
        wiring: &Wiring,
        config: &EmuConfig,
    ) -> Result<Box<dyn MainProcessor>>;

    fn serial_bus(&self, wiring: &Wiring, config: &EmuConfig) -> Result<Box<dyn SerialBus>>;

    /// Build a freshly reset drive unit.
    fn drive(&self, wiring: &Wiring, config: &EmuConfig) -> Result<DriveUnit>;
}
