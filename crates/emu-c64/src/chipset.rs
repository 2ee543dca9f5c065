//! The fixed collection of active chips.

use emu_core::Chip;
use log::debug;

use crate::chips::{
    AudioChip, ChipFactory, DriveUnit, MainProcessor, SerialBus, TimerChip, TimerId, VideoChip,
    Wiring,
};
use crate::config::EmuConfig;
use crate::error::Result;

/// Every chip of one C64, plus the optional drive.
///
/// Chips never own each other; cross-chip signals go through the
/// [`Wiring`] handles resolved at construction. The drive unit exists only
/// while drive emulation is enabled.
pub struct ChipSet {
    factory: Box<dyn ChipFactory>,
    wiring: Wiring,
    pub(crate) video: Box<dyn VideoChip>,
    pub(crate) audio: Box<dyn AudioChip>,
    pub(crate) timer1: Box<dyn TimerChip>,
    pub(crate) timer2: Box<dyn TimerChip>,
    pub(crate) cpu: Box<dyn MainProcessor>,
    pub(crate) serial: Box<dyn SerialBus>,
    pub(crate) drive: Option<DriveUnit>,
}

impl ChipSet {
    /// Build and wire every chip the configuration asks for.
    pub fn new(factory: Box<dyn ChipFactory>, config: &EmuConfig) -> Result<Self> {
        config.validate()?;
        let wiring = Wiring::new();

        let video = factory.video(&wiring, config)?;
        let audio = factory.audio(&wiring, config)?;
        let timer1 = factory.timer(TimerId::Cia1, &wiring, config)?;
        let timer2 = factory.timer(TimerId::Cia2, &wiring, config)?;
        let cpu = factory.main_processor(&wiring, config)?;
        let serial = factory.serial_bus(&wiring, config)?;
        let drive = if config.drive_emulation {
            Some(factory.drive(&wiring, config)?)
        } else {
            None
        };

        Ok(Self {
            factory,
            wiring,
            video,
            audio,
            timer1,
            timer2,
            cpu,
            serial,
            drive,
        })
    }

    /// Whether the drive processor is present.
    #[must_use]
    pub fn drive_enabled(&self) -> bool {
        self.drive.is_some()
    }

    /// Route a configuration change to every chip that reacts to one.
    ///
    /// Turning drive emulation on builds exactly one fresh (reset) drive
    /// unit; turning it off drops the unit. Re-applying the same setting
    /// keeps the existing unit.
    pub fn apply_config(&mut self, config: &EmuConfig) -> Result<()> {
        match (config.drive_emulation, self.drive.is_some()) {
            (true, false) => {
                debug!("drive emulation on ({})", config.drive_path);
                self.drive = Some(self.factory.drive(&self.wiring, config)?);
            }
            (false, true) => {
                debug!("drive emulation off");
                self.drive = None;
                self.wiring.drive_irq.clear();
            }
            _ => {}
        }

        self.video.apply_config(config);
        self.audio.apply_config(config);
        self.serial.apply_config(config);
        if let Some(drive) = self.drive.as_mut() {
            drive.cpu.apply_config(config);
            drive.job.apply_config(config);
        }
        Ok(())
    }

    /// Hard reset of every chip.
    pub fn reset(&mut self) {
        self.wiring.clear();
        self.cpu.reset();
        if let Some(drive) = self.drive.as_mut() {
            drive.cpu.reset();
        }
        self.video.reset();
        self.audio.reset();
        self.timer1.reset();
        self.timer2.reset();
        self.serial.reset();
    }

    /// Trigger an NMI on the main processor.
    pub fn nmi(&mut self) {
        self.cpu.nmi();
    }

    #[must_use]
    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    #[must_use]
    pub fn video(&self) -> &dyn VideoChip {
        self.video.as_ref()
    }

    #[must_use]
    pub fn audio(&self) -> &dyn AudioChip {
        self.audio.as_ref()
    }

    #[must_use]
    pub fn timer(&self, which: TimerId) -> &dyn TimerChip {
        match which {
            TimerId::Cia1 => self.timer1.as_ref(),
            TimerId::Cia2 => self.timer2.as_ref(),
        }
    }

    #[must_use]
    pub fn main_processor(&self) -> &dyn MainProcessor {
        self.cpu.as_ref()
    }

    #[must_use]
    pub fn drive(&self) -> Option<&DriveUnit> {
        self.drive.as_ref()
    }

    pub fn video_mut(&mut self) -> &mut dyn VideoChip {
        self.video.as_mut()
    }

    pub fn audio_mut(&mut self) -> &mut dyn AudioChip {
        self.audio.as_mut()
    }

    pub fn timer_mut(&mut self, which: TimerId) -> &mut dyn TimerChip {
        match which {
            TimerId::Cia1 => self.timer1.as_mut(),
            TimerId::Cia2 => self.timer2.as_mut(),
        }
    }

    pub fn main_processor_mut(&mut self) -> &mut dyn MainProcessor {
        self.cpu.as_mut()
    }

    pub fn drive_mut(&mut self) -> Option<&mut DriveUnit> {
        self.drive.as_mut()
    }
}
