//! Top-level C64 system.
//!
//! [`C64`] is the context object that owns everything one emulated machine
//! needs: the chip set, the configuration, the run-state flags shared with
//! the control thread, the cycle counter and the vertical-blank work done
//! at the end of every frame.
//!
//! # Frame end
//!
//! When the video chip latches frame-complete, after the cycle or line that
//! completed it:
//! 1. CIA 1, CIA 2: count time-of-day
//! 2. Frame counter
//! 3. Drawn frames (one in `skip_frames + 1`): the video chip's back buffer
//!    is swapped into the handoff slot
//! 4. Unless paused: speed governor paces and measures the frame

use std::ops::ControlFlow;
use std::sync::Arc;

use emu_core::{ChipFault, Observable, Processor, Ticks, Value};
use log::{debug, error, info, warn};

use crate::chips::ChipFactory;
use crate::chipset::ChipSet;
use crate::config::{EmuConfig, EmulationMode};
use crate::error::{Error, Result};
use crate::governor::{Clock, SpeedGovernor, SpeedStats};
use crate::handoff::{FrameConsumer, FrameProducer, frame_handoff};
use crate::run_state::RunState;
use crate::scheduler::{self, CycleExit, FrameHook};

/// Vertical-blank work, run by the scheduler when a frame completes.
struct FrameEnd {
    run_state: Arc<RunState>,
    frame_count: u64,
    skip_frames: u32,
    skip_counter: u32,
    producer: Option<FrameProducer>,
    governor: Option<SpeedGovernor>,
    /// Make the cycle loop yield after this frame.
    stop_at_frame_end: bool,
}

impl FrameEnd {
    fn publish(&mut self, chips: &mut ChipSet) {
        let Some(producer) = self.producer.as_mut() else {
            return;
        };
        if !producer.publish(chips.video.frame_buffer()) {
            debug!("frame handoff contended, frame {} dropped", self.frame_count);
        }
    }
}

impl FrameHook for FrameEnd {
    fn frame_complete(&mut self, chips: &mut ChipSet) -> ControlFlow<()> {
        chips.timer1.count_tod();
        chips.timer2.count_tod();
        self.frame_count += 1;

        if self.skip_counter == 0 {
            self.skip_counter = self.skip_frames;
            self.publish(chips);
        } else {
            self.skip_counter -= 1;
        }

        if !self.run_state.pause_requested() {
            if let Some(governor) = self.governor.as_mut() {
                let timing = governor.end_frame();
                if let Some(fps) = timing.fps {
                    debug!("{}% speed, {fps:.1} fps", timing.speed_percent);
                }
            }
        }

        if self.stop_at_frame_end {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Where a stopped machine stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Position {
    /// Nothing has run since the last completed frame.
    FrameBoundary,
    /// Every processor sits on an instruction boundary, as left by a
    /// snapshot save or load.
    Reconciled,
    /// Partway through a frame.
    MidFrame,
}

impl Position {
    fn after_frame(frame_complete: bool) -> Self {
        if frame_complete {
            Position::FrameBoundary
        } else {
            Position::MidFrame
        }
    }
}

/// C64 system.
pub struct C64 {
    chips: ChipSet,
    config: EmuConfig,
    run_state: Arc<RunState>,
    /// Cycles elapsed in cycle-exact mode.
    master_clock: Ticks,
    frame_end: FrameEnd,
    position: Position,
    /// Audio is held and the governor must restart on resume.
    suspended: bool,
    /// The fault that halted the run.
    fault: Option<ChipFault>,
}

impl C64 {
    /// Build a machine from a chip factory and a configuration.
    ///
    /// Fails with [`Error::Configuration`] when the configuration is invalid
    /// or a chip can't be built.
    pub fn new(factory: Box<dyn ChipFactory>, config: EmuConfig) -> Result<Self> {
        let chips = ChipSet::new(factory, &config)?;
        let run_state = Arc::new(RunState::new());
        info!(
            "C64 {:?}, {} mode, drive {}",
            config.model,
            config.mode.name(),
            if config.drive_emulation { "on" } else { "off" }
        );

        Ok(Self {
            chips,
            frame_end: FrameEnd {
                run_state: Arc::clone(&run_state),
                frame_count: 0,
                skip_frames: config.skip_frames,
                skip_counter: 0,
                producer: None,
                governor: None,
                stop_at_frame_end: false,
            },
            config,
            run_state,
            master_clock: Ticks::ZERO,
            position: Position::FrameBoundary,
            suspended: false,
            fault: None,
        })
    }

    /// Publish drawn frames to a triple buffer; the returned consumer
    /// belongs to the presentation thread.
    ///
    /// The video chip's own buffer becomes the back buffer, so it must
    /// match the frame format exactly.
    pub fn attach_display(&mut self) -> Result<FrameConsumer> {
        let format = self.chips.video.frame_format();
        let drawn = self.chips.video.frame_buffer().len();
        if drawn != format.size() {
            return Err(Error::Configuration(format!(
                "video buffer is {drawn} bytes, a {}x{} frame needs {}",
                format.width,
                format.height,
                format.size()
            )));
        }

        let (producer, consumer) = frame_handoff(format);
        self.frame_end.producer = Some(producer);
        Ok(consumer)
    }

    /// Pace frames against `clock` at the configured refresh rate.
    pub fn attach_governor(&mut self, clock: Box<dyn Clock>) -> Arc<SpeedStats> {
        let governor =
            SpeedGovernor::new(clock, self.config.refresh_hz(), self.config.limit_speed);
        let stats = governor.stats();
        self.frame_end.governor = Some(governor);
        stats
    }

    /// Flags shared with the control thread.
    #[must_use]
    pub fn run_state(&self) -> Arc<RunState> {
        Arc::clone(&self.run_state)
    }

    /// One emulation step in the current mode.
    ///
    /// Cycle-exact: cycles until a state change (pause, quit) is requested.
    /// Line-based: one raster line.
    pub fn step(&mut self) -> Result<()> {
        match self.config.mode {
            EmulationMode::CycleExact => self.run_cycles(false).map(|_| ()),
            EmulationMode::LineBased => self.run_line().map(|_| ()),
        }
    }

    /// Run until the video chip completes a frame. Returns the processor
    /// cycles emulated.
    ///
    /// In cycle-exact mode a state change request ends the frame early.
    pub fn run_frame(&mut self) -> Result<u64> {
        match self.config.mode {
            EmulationMode::CycleExact => {
                let start = self.master_clock;
                self.run_cycles(true)?;
                Ok((self.master_clock - start).get())
            }
            EmulationMode::LineBased => {
                let mut cycles = 0;
                loop {
                    let (line, frame_complete) = self.run_line()?;
                    cycles += u64::from(line);
                    if frame_complete {
                        return Ok(cycles);
                    }
                }
            }
        }
    }

    /// Exactly one cycle-exact step of every chip, for single-stepping.
    pub fn step_cycle(&mut self) -> Result<()> {
        self.check_running()?;
        if let Err(fault) = scheduler::step_cycle(&mut self.chips, &mut self.master_clock) {
            return Err(self.halt(fault));
        }

        let frame_complete = self.chips.video.take_frame_complete();
        if frame_complete {
            let _ = self.frame_end.frame_complete(&mut self.chips);
        }
        self.position = Position::after_frame(frame_complete);
        Ok(())
    }

    /// Run to the end of the current frame unless already at a save point,
    /// or until quit is requested.
    pub fn finish_frame(&mut self) -> Result<()> {
        while !self.at_save_point() && !self.run_state.quit_requested() {
            self.run_frame()?;
        }
        Ok(())
    }

    fn run_cycles(&mut self, stop_at_frame_end: bool) -> Result<CycleExit> {
        self.check_running()?;
        self.frame_end.stop_at_frame_end = stop_at_frame_end;
        let start = self.master_clock;

        let exit = match scheduler::run_cycles(
            &mut self.chips,
            &self.run_state,
            &mut self.master_clock,
            &mut self.frame_end,
        ) {
            Ok(exit) => exit,
            Err(fault) => return Err(self.halt(fault)),
        };

        match exit {
            CycleExit::FrameComplete => self.position = Position::FrameBoundary,
            CycleExit::StateChange if self.master_clock != start => {
                self.position = Position::MidFrame;
            }
            CycleExit::StateChange => {}
        }
        Ok(exit)
    }

    /// One line-based step; returns the line's cycles and whether it
    /// completed a frame.
    fn run_line(&mut self) -> Result<(u32, bool)> {
        self.check_running()?;
        let line = match scheduler::step_line(&mut self.chips, self.config.drive_cycles_per_line)
        {
            Ok(line) => line,
            Err(fault) => return Err(self.halt(fault)),
        };

        if line.frame_complete {
            let _ = self.frame_end.frame_complete(&mut self.chips);
        }
        self.position = Position::after_frame(line.frame_complete);
        Ok((line.cycles, line.frame_complete))
    }

    fn check_running(&self) -> Result<()> {
        match &self.fault {
            Some(fault) => Err(Error::ChipFault(fault.clone())),
            None => Ok(()),
        }
    }

    /// A chip fault stops the run for good.
    fn halt(&mut self, fault: ChipFault) -> Error {
        error!("{fault}; emulation halted");
        self.run_state.request_quit();
        self.fault = Some(fault.clone());
        Error::ChipFault(fault)
    }

    /// The fault that halted the run, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&ChipFault> {
        self.fault.as_ref()
    }

    /// Pause: request it on the shared flags and hold the audio.
    /// Idempotent.
    pub fn pause(&mut self) {
        self.run_state.request_pause();
        if !self.suspended {
            self.suspended = true;
            self.chips.audio.pause_sound();
            info!("paused at {}", self.master_clock);
        }
    }

    /// Resume after [`pause`](Self::pause); pacing restarts from now.
    pub fn resume(&mut self) {
        self.run_state.resume();
        if self.suspended {
            self.suspended = false;
            self.chips.audio.resume_sound();
            if let Some(governor) = self.frame_end.governor.as_mut() {
                governor.restart();
            }
            info!("resumed");
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.run_state.pause_requested()
    }

    /// Ask the run to stop.
    pub fn quit(&self) {
        self.run_state.request_quit();
    }

    /// Hard reset of every chip.
    pub fn reset(&mut self) {
        info!("hard reset");
        self.chips.reset();
        self.position = Position::FrameBoundary;
    }

    /// Non-maskable interrupt to the main processor (RESTORE key).
    pub fn nmi(&mut self) {
        self.chips.nmi();
    }

    /// Apply a new configuration.
    ///
    /// This is the only way to change settings on a live machine. Turning
    /// drive emulation on attaches a freshly reset drive; turning it off
    /// detaches it. The emulation mode can only change through
    /// [`set_mode`](Self::set_mode).
    pub fn apply_config(&mut self, config: EmuConfig) -> Result<()> {
        config.validate()?;
        if config.mode != self.config.mode {
            return Err(Error::Configuration(format!(
                "can't switch to {} mode without a reset",
                config.mode.name()
            )));
        }

        self.chips.apply_config(&config)?;

        self.frame_end.skip_frames = config.skip_frames;
        self.frame_end.skip_counter = self.frame_end.skip_counter.min(config.skip_frames);
        if let Some(governor) = self.frame_end.governor.as_mut() {
            governor.set_limit_speed(config.limit_speed);
            if config.refresh_hz() != self.config.refresh_hz() {
                governor.set_refresh_hz(config.refresh_hz());
            }
        }
        self.config = config;
        Ok(())
    }

    /// Switch emulation mode. Only while paused; the machine is hard reset
    /// and the cycle counter restarts at zero.
    pub fn set_mode(&mut self, mode: EmulationMode) -> Result<()> {
        if !self.is_paused() {
            return Err(Error::Configuration(
                "the emulation mode can only change while paused".into(),
            ));
        }
        if mode == self.config.mode {
            return Ok(());
        }

        warn!(
            "switching from {} to {} mode; resetting",
            self.config.mode.name(),
            mode.name()
        );
        self.config.mode = mode;
        self.reset();
        self.master_clock.reset();
        Ok(())
    }

    #[must_use]
    pub fn mode(&self) -> EmulationMode {
        self.config.mode
    }

    #[must_use]
    pub fn config(&self) -> &EmuConfig {
        &self.config
    }

    /// Cycles elapsed in cycle-exact mode.
    #[must_use]
    pub fn master_clock(&self) -> Ticks {
        self.master_clock
    }

    /// Chips and cycle counter, borrowed together for snapshot alignment.
    pub(crate) fn chips_and_clock(&mut self) -> (&mut ChipSet, &mut Ticks) {
        (&mut self.chips, &mut self.master_clock)
    }

    /// Completed frames.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_end.frame_count
    }

    /// Nothing has run since the last completed frame.
    #[must_use]
    pub fn at_frame_boundary(&self) -> bool {
        self.position == Position::FrameBoundary
    }

    /// A snapshot can be taken here: at a frame boundary, or at the
    /// instant a previous save or load left every processor aligned.
    #[must_use]
    pub fn at_save_point(&self) -> bool {
        self.position != Position::MidFrame
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    #[must_use]
    pub fn chips(&self) -> &ChipSet {
        &self.chips
    }

    pub fn chips_mut(&mut self) -> &mut ChipSet {
        &mut self.chips
    }

    fn speed_stats(&self) -> Option<Arc<SpeedStats>> {
        self.frame_end.governor.as_ref().map(SpeedGovernor::stats)
    }
}

const QUERY_PATHS: &[&str] = &[
    "master_clock",
    "frame_count",
    "mode",
    "paused",
    "at_frame_boundary",
    "at_save_point",
    "drive.enabled",
    "drive.idle",
    "cpu.instruction_boundary",
    "speed",
    "fps",
];

impl Observable for C64 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "master_clock" => Some(self.master_clock.get().into()),
            "frame_count" => Some(self.frame_count().into()),
            "mode" => Some(self.config.mode.name().into()),
            "paused" => Some(self.is_paused().into()),
            "at_frame_boundary" => Some(self.at_frame_boundary().into()),
            "at_save_point" => Some(self.at_save_point().into()),
            "drive.enabled" => Some(self.chips.drive_enabled().into()),
            "drive.idle" => self.chips.drive().map(|d| d.cpu.is_idle().into()),
            "cpu.instruction_boundary" => {
                Some(self.chips.cpu.is_instruction_boundary().into())
            }
            "speed" => self.speed_stats().map(|s| s.speed_percent().into()),
            "fps" => self.speed_stats().and_then(|s| s.fps()).map(Value::from),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        QUERY_PATHS
    }
}
