//! Instrumented stub chips.
//!
//! Every stub is deterministic: the same calls in the same order produce
//! the same state. Calls are recorded on a shared trace so tests can check
//! the scheduling order. Processors execute a fixed cyclic list of
//! instruction costs.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use emu_c64::{
    AudioChip, C64, ChipFactory, DiskJob, DriveProcessor, DriveUnit, EmuConfig, FrameFormat,
    MainProcessor, SerialBus, TimerChip, TimerId, VideoChip, Wiring,
};
use emu_core::{
    Chip, ChipFault, ChipState, InterruptLine, Processor, StateError, StateReader, StateWriter,
    Stateful,
};
use parking_lot::Mutex;

pub const CYCLES_PER_LINE: u32 = 63;
pub const LINES_PER_FRAME: u32 = 8;
pub const CYCLES_PER_FRAME: u64 = (CYCLES_PER_LINE * LINES_PER_FRAME) as u64;

/// Main processor instruction costs, repeating.
pub const CPU_COSTS: [u32; 7] = [2, 3, 4, 6, 2, 5, 7];
/// Drive processor instruction costs, repeating.
pub const DRIVE_COSTS: [u32; 3] = [3, 2, 5];

/// Cycles between timer interrupts.
const TIMER_PERIOD: [u64; 2] = [97, 131];
/// Cycles a timer holds its interrupt line.
const IRQ_HOLD: u32 = 9;

const FORMAT: FrameFormat = FrameFormat {
    width: 16,
    height: 4,
    bytes_per_pixel: 1,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Video,
    VideoLine,
    Audio(u32),
    CheckIrqs(u8),
    Timer(u8),
    TimerLine(u8, u32),
    Cpu,
    CpuLine(u32),
    DriveTimers(u32),
    Drive,
    DriveLine(u32),
}

/// Shared call log.
#[derive(Debug, Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<Event>>>);

impl Trace {
    fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock())
    }
}

/// Knobs shared between a test and the stubs it builds.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    pub trace: Trace,
    pub drive_idle: Arc<AtomicBool>,
    pub cpu_fault: Arc<AtomicBool>,
    /// The main processor never reaches an instruction boundary.
    pub cpu_stuck: Arc<AtomicBool>,
    /// Neither does the drive processor.
    pub drive_stuck: Arc<AtomicBool>,
    /// Build the video chip with a buffer one byte short of its format.
    pub short_video_buffer: Arc<AtomicBool>,
    pub drives_built: Arc<AtomicUsize>,
    pub drives_alive: Arc<AtomicUsize>,
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

pub struct StubVideo {
    cycle: u32,
    line: u32,
    frames: u8,
    frame_complete: bool,
    buffer: Vec<u8>,
    trace: Trace,
}

impl StubVideo {
    fn end_line(&mut self) {
        self.cycle = 0;
        self.line += 1;
        if self.line == LINES_PER_FRAME {
            self.line = 0;
            self.frames = self.frames.wrapping_add(1);
            self.frame_complete = true;
            self.buffer.fill(self.frames);
        }
    }
}

impl Stateful for StubVideo {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        w.u32(self.cycle)
            .u32(self.line)
            .u8(self.frames)
            .bool(self.frame_complete);
        w.finish(*b"VIC2", 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        let mut r = state.expect(*b"VIC2", 1)?;
        self.cycle = r.u32()?;
        self.line = r.u32()?;
        self.frames = r.u8()?;
        self.frame_complete = r.bool()?;
        self.buffer.fill(self.frames);
        Ok(())
    }
}

impl Chip for StubVideo {
    fn step_cycle(&mut self) -> Result<bool, ChipFault> {
        self.trace.push(Event::Video);
        self.cycle += 1;
        if self.cycle == CYCLES_PER_LINE {
            self.end_line();
            return Ok(true);
        }
        Ok(false)
    }

    fn step_line(&mut self, _budget: u32) -> Result<u32, ChipFault> {
        self.trace.push(Event::VideoLine);
        self.end_line();
        Ok(CYCLES_PER_LINE)
    }

    fn reset(&mut self) {
        self.cycle = 0;
        self.line = 0;
        self.frames = 0;
        self.frame_complete = false;
        self.buffer.fill(0);
    }
}

impl VideoChip for StubVideo {
    fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    fn frame_buffer(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }

    fn frame_format(&self) -> FrameFormat {
        FORMAT
    }

    fn cycles_per_line(&self) -> u32 {
        CYCLES_PER_LINE
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

pub struct StubAudio {
    cycles: u64,
    paused: bool,
    trace: Trace,
}

impl Stateful for StubAudio {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        w.u64(self.cycles);
        w.finish(*b"SID0", 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        self.cycles = state.expect(*b"SID0", 1)?.u64()?;
        Ok(())
    }
}

impl Chip for StubAudio {
    fn step_cycle(&mut self) -> Result<bool, ChipFault> {
        self.cycles += 1;
        Ok(false)
    }

    fn step_line(&mut self, budget: u32) -> Result<u32, ChipFault> {
        self.trace.push(Event::Audio(budget));
        self.cycles += u64::from(budget);
        Ok(budget)
    }

    fn reset(&mut self) {
        self.cycles = 0;
    }
}

impl AudioChip for StubAudio {
    fn pause_sound(&mut self) {
        self.paused = true;
    }

    fn resume_sound(&mut self) {
        self.paused = false;
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

pub struct StubTimer {
    id: u8,
    counter: u64,
    pending: bool,
    hold: u32,
    tod: u32,
    line: InterruptLine,
    trace: Trace,
}

impl StubTimer {
    fn period(&self) -> u64 {
        TIMER_PERIOD[usize::from(self.id - 1)]
    }

    fn tag(&self) -> [u8; 4] {
        [b'C', b'I', b'A', b'0' + self.id]
    }

    fn count(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.counter += 1;
            if self.counter % self.period() == 0 {
                self.pending = true;
            }
            if self.hold > 0 {
                self.hold -= 1;
                if self.hold == 0 {
                    self.line.release(self.id);
                }
            }
        }
    }

    fn latch(&mut self) {
        if self.pending {
            self.pending = false;
            self.hold = IRQ_HOLD;
            self.line.assert(self.id);
        }
    }
}

impl Stateful for StubTimer {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        w.u64(self.counter)
            .bool(self.pending)
            .u32(self.hold)
            .u32(self.tod);
        w.finish(self.tag(), 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        let mut r = state.expect(self.tag(), 1)?;
        self.counter = r.u64()?;
        self.pending = r.bool()?;
        self.hold = r.u32()?;
        self.tod = r.u32()?;
        self.line.set(self.id, self.hold > 0);
        Ok(())
    }
}

impl Chip for StubTimer {
    fn step_cycle(&mut self) -> Result<bool, ChipFault> {
        self.trace.push(Event::Timer(self.id));
        self.count(1);
        Ok(false)
    }

    fn step_line(&mut self, budget: u32) -> Result<u32, ChipFault> {
        self.trace.push(Event::TimerLine(self.id, budget));
        self.count(u64::from(budget));
        self.latch();
        Ok(budget)
    }

    fn reset(&mut self) {
        self.counter = 0;
        self.pending = false;
        self.hold = 0;
        self.tod = 0;
        self.line.release(self.id);
    }
}

impl TimerChip for StubTimer {
    fn check_irqs(&mut self) {
        self.trace.push(Event::CheckIrqs(self.id));
        self.latch();
    }

    fn count_tod(&mut self) {
        self.tod += 1;
    }
}

// ---------------------------------------------------------------------------
// Processors
// ---------------------------------------------------------------------------

/// Register file shared by both stub processors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    /// Index of the current instruction.
    pub pc: u64,
    /// Cycles spent in the current instruction.
    pub cycle: u32,
    /// Checksum of every completed instruction and the interrupt line
    /// seen when it completed.
    pub acc: u64,
    /// Total cycles executed.
    pub cycles: u64,
    pub nmis: u32,
}

impl Registers {
    pub fn is_boundary(&self) -> bool {
        self.cycle == 0
    }

    fn cost(&self, costs: &[u32]) -> u32 {
        costs[(self.pc % costs.len() as u64) as usize]
    }

    /// One cycle; returns true when an instruction completed.
    fn clock(&mut self, costs: &[u32], irq: bool) -> bool {
        self.cycle += 1;
        self.cycles += 1;
        if self.cycle < self.cost(costs) {
            return false;
        }
        self.cycle = 0;
        self.acc = self
            .acc
            .wrapping_mul(31)
            .wrapping_add(self.pc)
            .wrapping_add(u64::from(irq));
        self.pc += 1;
        true
    }

    /// Finish the current instruction, or run one whole one. Returns the
    /// cycles used.
    fn instruction(&mut self, costs: &[u32], irq: bool) -> u32 {
        let mut used = 0;
        loop {
            used += 1;
            if self.clock(costs, irq) {
                return used;
            }
        }
    }

    fn write(&self, w: &mut StateWriter) {
        w.u64(self.pc)
            .u32(self.cycle)
            .u64(self.acc)
            .u64(self.cycles)
            .u32(self.nmis);
    }

    fn read(r: &mut StateReader<'_>) -> Result<Self, StateError> {
        Ok(Self {
            pc: r.u64()?,
            cycle: r.u32()?,
            acc: r.u64()?,
            cycles: r.u64()?,
            nmis: r.u32()?,
        })
    }

    /// Registers from a captured processor state.
    pub fn decode(state: &ChipState) -> Self {
        let mut r = state
            .expect(state.tag(), state.version())
            .expect("processor state");
        Self::read(&mut r).expect("processor registers")
    }
}

pub struct StubCpu {
    regs: Registers,
    irq: InterruptLine,
    fault: Arc<AtomicBool>,
    stuck: Arc<AtomicBool>,
    trace: Trace,
}

impl StubCpu {
    fn check_fault(&self) -> Result<(), ChipFault> {
        if self.fault.load(Ordering::Relaxed) {
            return Err(ChipFault::new("6510", "illegal opcode"));
        }
        Ok(())
    }
}

impl Stateful for StubCpu {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        self.regs.write(&mut w);
        w.finish(*b"6510", 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        self.regs = Registers::read(&mut state.expect(*b"6510", 1)?)?;
        Ok(())
    }
}

impl Chip for StubCpu {
    fn step_cycle(&mut self) -> Result<bool, ChipFault> {
        self.check_fault()?;
        self.trace.push(Event::Cpu);
        self.regs.clock(&CPU_COSTS, self.irq.is_asserted());
        Ok(false)
    }

    fn step_line(&mut self, budget: u32) -> Result<u32, ChipFault> {
        self.check_fault()?;
        self.trace.push(Event::CpuLine(budget));
        let mut used = 0;
        while used < budget {
            used += self.regs.instruction(&CPU_COSTS, self.irq.is_asserted());
        }
        Ok(used)
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
    }
}

impl Processor for StubCpu {
    fn is_instruction_boundary(&self) -> bool {
        self.regs.cycle == 0 && !self.stuck.load(Ordering::Relaxed)
    }
}

impl MainProcessor for StubCpu {
    fn nmi(&mut self) {
        self.regs.nmis += 1;
    }
}

pub struct StubDrive {
    regs: Registers,
    via_cycles: u64,
    idle: Arc<AtomicBool>,
    stuck: Arc<AtomicBool>,
    alive: Arc<AtomicUsize>,
    trace: Trace,
}

impl Drop for StubDrive {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Stateful for StubDrive {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        self.regs.write(&mut w);
        w.u64(self.via_cycles);
        w.finish(*b"1541", 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        let mut r = state.expect(*b"1541", 1)?;
        self.regs = Registers::read(&mut r)?;
        self.via_cycles = r.u64()?;
        Ok(())
    }
}

impl Chip for StubDrive {
    fn step_cycle(&mut self) -> Result<bool, ChipFault> {
        self.trace.push(Event::Drive);
        self.regs.clock(&DRIVE_COSTS, false);
        Ok(false)
    }

    fn step_line(&mut self, budget: u32) -> Result<u32, ChipFault> {
        self.trace.push(Event::DriveLine(budget));
        let mut used = 0;
        while used < budget {
            used += self.regs.instruction(&DRIVE_COSTS, false);
        }
        Ok(used)
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
        self.via_cycles = 0;
    }
}

impl Processor for StubDrive {
    fn is_instruction_boundary(&self) -> bool {
        self.regs.cycle == 0 && !self.stuck.load(Ordering::Relaxed)
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }
}

impl DriveProcessor for StubDrive {
    fn count_timers(&mut self, cycles: u32) {
        self.trace.push(Event::DriveTimers(cycles));
        self.via_cycles += u64::from(cycles);
    }
}

pub struct StubJob {
    track: u8,
}

impl Stateful for StubJob {
    fn capture_state(&self) -> ChipState {
        let mut w = StateWriter::new();
        w.u8(self.track);
        w.finish(*b"JOB1", 1)
    }

    fn restore_state(&mut self, state: &ChipState) -> Result<(), StateError> {
        self.track = state.expect(*b"JOB1", 1)?.u8()?;
        Ok(())
    }
}

impl DiskJob for StubJob {}

pub struct StubBus;

impl SerialBus for StubBus {
    fn reset(&mut self) {}
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

pub struct StubFactory {
    pub controls: Controls,
}

impl ChipFactory for StubFactory {
    fn video(&self, _: &Wiring, _: &EmuConfig) -> emu_c64::Result<Box<dyn VideoChip>> {
        let short = self.controls.short_video_buffer.load(Ordering::Relaxed);
        Ok(Box::new(StubVideo {
            cycle: 0,
            line: 0,
            frames: 0,
            frame_complete: false,
            buffer: vec![0; FORMAT.size() - usize::from(short)],
            trace: self.controls.trace.clone(),
        }))
    }

    fn audio(&self, _: &Wiring, _: &EmuConfig) -> emu_c64::Result<Box<dyn AudioChip>> {
        Ok(Box::new(StubAudio {
            cycles: 0,
            paused: false,
            trace: self.controls.trace.clone(),
        }))
    }

    fn timer(
        &self,
        which: TimerId,
        wiring: &Wiring,
        _: &EmuConfig,
    ) -> emu_c64::Result<Box<dyn TimerChip>> {
        let (id, line) = match which {
            TimerId::Cia1 => (1, wiring.irq.clone()),
            TimerId::Cia2 => (2, wiring.nmi.clone()),
        };
        Ok(Box::new(StubTimer {
            id,
            counter: 0,
            pending: false,
            hold: 0,
            tod: 0,
            line,
            trace: self.controls.trace.clone(),
        }))
    }

    fn main_processor(
        &self,
        wiring: &Wiring,
        _: &EmuConfig,
    ) -> emu_c64::Result<Box<dyn MainProcessor>> {
        Ok(Box::new(StubCpu {
            regs: Registers::default(),
            irq: wiring.irq.clone(),
            fault: Arc::clone(&self.controls.cpu_fault),
            stuck: Arc::clone(&self.controls.cpu_stuck),
            trace: self.controls.trace.clone(),
        }))
    }

    fn serial_bus(&self, _: &Wiring, _: &EmuConfig) -> emu_c64::Result<Box<dyn SerialBus>> {
        Ok(Box::new(StubBus))
    }

    fn drive(&self, _: &Wiring, config: &EmuConfig) -> emu_c64::Result<DriveUnit> {
        if config.drive_path.ends_with(".missing") {
            return Err(emu_c64::Error::Configuration(format!(
                "no disk image at {}",
                config.drive_path
            )));
        }
        self.controls.drives_built.fetch_add(1, Ordering::SeqCst);
        self.controls.drives_alive.fetch_add(1, Ordering::SeqCst);
        Ok(DriveUnit {
            cpu: Box::new(StubDrive {
                regs: Registers::default(),
                via_cycles: 0,
                idle: Arc::clone(&self.controls.drive_idle),
                stuck: Arc::clone(&self.controls.drive_stuck),
                alive: Arc::clone(&self.controls.drives_alive),
                trace: self.controls.trace.clone(),
            }),
            job: Box::new(StubJob { track: 18 }),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn config(mode: emu_c64::EmulationMode, drive: bool) -> EmuConfig {
    EmuConfig {
        mode,
        drive_emulation: drive,
        drive_path: if drive { "disks/test.d64".into() } else { String::new() },
        drive_cycles_per_line: 16,
        limit_speed: false,
        ..EmuConfig::default()
    }
}

pub fn machine(config: EmuConfig) -> (C64, Controls) {
    let controls = Controls::default();
    let c64 = machine_with(config, &controls).expect("stub machine");
    (c64, controls)
}

/// Build a machine from stubs wired to existing controls.
pub fn machine_with(config: EmuConfig, controls: &Controls) -> emu_c64::Result<C64> {
    let factory = StubFactory {
        controls: controls.clone(),
    };
    C64::new(Box::new(factory), config)
}

/// Every chip's captured state, in snapshot order.
pub fn chip_states(c64: &C64) -> Vec<ChipState> {
    let chips = c64.chips();
    let mut states = vec![
        chips.video().capture_state(),
        chips.audio().capture_state(),
        chips.timer(TimerId::Cia1).capture_state(),
        chips.timer(TimerId::Cia2).capture_state(),
        chips.main_processor().capture_state(),
    ];
    if let Some(drive) = chips.drive() {
        states.push(drive.cpu.capture_state());
        states.push(drive.job.capture_state());
    }
    states
}

pub fn cpu_registers(c64: &C64) -> Registers {
    Registers::decode(&c64.chips().main_processor().capture_state())
}

pub fn drive_registers(c64: &C64) -> Option<Registers> {
    c64.chips()
        .drive()
        .map(|d| Registers::decode(&d.cpu.capture_state()))
}

/// Step `n` full cycles directly through the scheduler.
pub fn step_cycles(c64: &mut C64, n: u64) {
    for _ in 0..n {
        c64.step_cycle().expect("cycle");
    }
}
