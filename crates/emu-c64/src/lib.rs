//! Commodore 64 scheduling and synchronization engine.
//!
//! Drives a set of C64 chips (VIC-II, SID, two CIAs, the 6510 and an
//! optional 1541 drive) in one of two modes: cycle-exact, where every chip
//! advances one cycle at a time in hardware order, or line-based, where
//! they advance one raster line at a time. Around that sit snapshot
//! save/load aligned on instruction boundaries, real-time pacing, and a
//! triple-buffered frame handoff to a presentation thread.
//!
//! The chips themselves are supplied through a [`ChipFactory`].

mod c64;
pub mod chips;
pub mod chipset;
pub mod config;
mod error;
pub mod governor;
pub mod handoff;
mod reconciler;
pub mod run_state;
pub mod scheduler;
pub mod session;
pub mod snapshot;

pub use c64::C64;
pub use chips::{
    AudioChip, ChipFactory, DiskJob, DriveProcessor, DriveUnit, MainProcessor, SerialBus,
    TimerChip, TimerId, VideoChip, Wiring,
};
pub use chipset::ChipSet;
pub use config::{C64Model, EmuConfig, EmulationMode};
pub use error::{Error, Recovery, Result, SnapshotError};
pub use governor::{Clock, ManualClock, SpeedGovernor, SpeedStats, SystemClock};
pub use handoff::{FrameConsumer, FrameFormat, FrameProducer, frame_handoff};
pub use run_state::RunState;
pub use session::Session;
pub use snapshot::Snapshot;
