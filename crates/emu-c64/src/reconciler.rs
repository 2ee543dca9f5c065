//! Snapshot save and load.
//!
//! Processors can only be captured between instructions, but a frame
//! boundary rarely falls on one. Saving therefore advances the whole
//! machine cycle by cycle until each processor reaches an instruction
//! boundary, recording how far it had to go (its delay). Loading restores
//! every chip and then replays those delays on the chips that were
//! captured earlier, so all of them end up at the same instant again.
//!
//! # Load order
//!
//! 1. Restore VIC-II, SID, CIA 1, CIA 2, 6510
//! 2. Catch-up 1: `cpu_delay` cycles of VIC-II, SID and CIAs
//! 3. Drive section: enable the drive through the configuration path,
//!    restore 1541 and disk job, then catch-up 2: the drive's delay in
//!    cycles of everything but the 1541
//! 4. No drive section: disable a live drive

use std::path::Path;

use emu_core::{ChipFault, ChipState, Processor, StateError, Stateful, Ticks};
use log::{debug, info, warn};

use crate::c64::{C64, Position};
use crate::chipset::ChipSet;
use crate::error::{Error, SnapshotError};
use crate::scheduler::{self, Lanes};
use crate::snapshot::{DriveSnapshot, Snapshot};

#[derive(Debug, Clone, Copy)]
enum Aligned {
    MainProcessor,
    Drive,
}

impl Aligned {
    fn name(self) -> &'static str {
        match self {
            Aligned::MainProcessor => "6510",
            Aligned::Drive => "1541",
        }
    }

    fn reached(self, chips: &ChipSet) -> bool {
        match self {
            Aligned::MainProcessor => chips.cpu.is_instruction_boundary(),
            Aligned::Drive => chips
                .drive
                .as_ref()
                .is_none_or(|d| d.cpu.is_idle() || d.cpu.is_instruction_boundary()),
        }
    }
}

/// Step the whole machine until `which` sits on an instruction boundary.
/// Returns the number of cycles it took.
fn align(chips: &mut ChipSet, clock: &mut Ticks, which: Aligned) -> Result<u8, SnapshotError> {
    let mut delay: u8 = 0;
    while !which.reached(chips) {
        if delay == u8::MAX {
            return Err(SnapshotError::Unresolved {
                processor: which.name(),
            });
        }
        scheduler::step_cycle(chips, clock).map_err(SnapshotError::CatchUp)?;
        delay += 1;
    }
    Ok(delay)
}

/// Replay `cycles` cycles of the chips in `lanes`.
fn catch_up(chips: &mut ChipSet, cycles: u8, lanes: Lanes) -> Result<(), ChipFault> {
    for _ in 0..cycles {
        scheduler::advance_cycle(chips, lanes)?;
    }
    Ok(())
}

fn restore<C: Stateful + ?Sized>(
    chip: &mut C,
    name: &'static str,
    state: &ChipState,
) -> Result<(), SnapshotError> {
    chip.restore_state(state)
        .map_err(|source: StateError| SnapshotError::InvalidState { chip: name, source })
}

impl C64 {
    /// Capture the machine.
    ///
    /// Must be paused at a save point: a frame boundary, or the instant a
    /// previous save or load left off. The processors are advanced to
    /// their next instruction boundaries first, so the live machine moves
    /// on by up to the recorded delays and stays at a save point.
    ///
    /// A chip fault while aligning hard resets the machine. A processor
    /// that never aligns leaves it partway through a frame.
    pub fn save_snapshot(&mut self) -> Result<Snapshot, SnapshotError> {
        if !self.is_paused() {
            return Err(SnapshotError::NotPaused);
        }
        if !self.at_save_point() {
            return Err(SnapshotError::NotAtFrameBoundary);
        }

        match self.capture() {
            Err(err @ SnapshotError::CatchUp(_)) => {
                warn!("snapshot save failed ({err}); resetting");
                self.reset();
                Err(err)
            }
            Err(err @ SnapshotError::Unresolved { .. }) => {
                self.set_position(Position::MidFrame);
                Err(err)
            }
            other => other,
        }
    }

    fn capture(&mut self) -> Result<Snapshot, SnapshotError> {
        let drive_path = self.config().drive_path.clone();
        let (chips, clock) = self.chips_and_clock();

        let video = chips.video.capture_state();
        let audio = chips.audio.capture_state();
        let timer1 = chips.timer1.capture_state();
        let timer2 = chips.timer2.capture_state();

        let cpu_delay = align(chips, clock, Aligned::MainProcessor)?;
        let cpu = chips.cpu.capture_state();

        let drive = if chips.drive.is_some() {
            let delay = align(chips, clock, Aligned::Drive)?;
            chips.drive.as_ref().map(|drive| DriveSnapshot {
                path: drive_path,
                cpu: drive.cpu.capture_state(),
                delay,
                job: drive.job.capture_state(),
            })
        } else {
            None
        };

        let moved = cpu_delay > 0 || drive.as_ref().is_some_and(|d| d.delay > 0);
        if moved {
            self.set_position(Position::Reconciled);
        }
        info!(
            "snapshot taken, 6510 delay {cpu_delay}{}",
            drive
                .as_ref()
                .map(|d| format!(", 1541 delay {}", d.delay))
                .unwrap_or_default()
        );

        Ok(Snapshot {
            video,
            audio,
            timer1,
            timer2,
            cpu,
            cpu_delay,
            drive,
        })
    }

    /// Restore the machine from a parsed snapshot.
    ///
    /// Must be paused. Afterwards the machine sits at the snapshot's
    /// aligned instant, which is itself a save point. If anything fails once live state has started to
    /// change, the machine is hard reset before the error is returned
    /// (`recovery()` reports [`Recovery::Reset`](crate::Recovery::Reset)).
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if !self.is_paused() {
            return Err(SnapshotError::NotPaused);
        }

        if let Err(err) = self.apply_snapshot(snapshot) {
            warn!("snapshot load failed ({err}); resetting");
            self.reset();
            return Err(err);
        }

        self.set_position(Position::Reconciled);
        info!("snapshot loaded");
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        {
            let chips = self.chips_mut();
            restore(chips.video.as_mut(), "VIC-II", &snapshot.video)?;
            restore(chips.audio.as_mut(), "SID", &snapshot.audio)?;
            restore(chips.timer1.as_mut(), "CIA 1", &snapshot.timer1)?;
            restore(chips.timer2.as_mut(), "CIA 2", &snapshot.timer2)?;
            restore(chips.cpu.as_mut(), "6510", &snapshot.cpu)?;

            debug!("catch-up 1: {} cycles", snapshot.cpu_delay);
            catch_up(chips, snapshot.cpu_delay, Lanes::PERIPHERALS)
                .map_err(SnapshotError::CatchUp)?;
        }

        match &snapshot.drive {
            Some(drive) => {
                let mut config = self.config().clone();
                config.drive_emulation = true;
                config.drive_path.clone_from(&drive.path);
                self.apply_config(config).map_err(config_error)?;

                let chips = self.chips_mut();
                let Some(unit) = chips.drive.as_mut() else {
                    return Err(SnapshotError::Configuration(
                        "drive emulation did not start".into(),
                    ));
                };
                restore(unit.cpu.as_mut(), "1541", &drive.cpu)?;
                restore(unit.job.as_mut(), "disk job", &drive.job)?;

                debug!("catch-up 2: {} cycles", drive.delay);
                catch_up(chips, drive.delay, Lanes::WITHOUT_DRIVE)
                    .map_err(SnapshotError::CatchUp)?;
            }
            None if self.config().drive_emulation => {
                let mut config = self.config().clone();
                config.drive_emulation = false;
                self.apply_config(config).map_err(config_error)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Capture the machine and write it to `path`.
    pub fn save_snapshot_to(&mut self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.save_snapshot()?;
        snapshot.save(path)?;
        info!("snapshot written to {}", path.display());
        Ok(())
    }

    /// Read a snapshot file completely, then restore it.
    ///
    /// A file that can't be parsed leaves the machine untouched.
    pub fn load_snapshot_from(&mut self, path: &Path) -> Result<(), SnapshotError> {
        if !self.is_paused() {
            return Err(SnapshotError::NotPaused);
        }
        let snapshot = Snapshot::load(path)?;
        self.load_snapshot(&snapshot)
    }
}

fn config_error(err: Error) -> SnapshotError {
    SnapshotError::Configuration(err.to_string())
}
