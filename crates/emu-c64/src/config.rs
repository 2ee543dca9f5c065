//! C64 configuration: model, scheduling mode, drive emulation and pacing.
//!
//! Read-only to the scheduler and speed governor. The only way to change a
//! live configuration is [`crate::C64::apply_config`], which routes the
//! change to every chip that needs to react.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::snapshot::DRIVE_PATH_LEN;

/// C64 model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum C64Model {
    /// PAL C64 (6569 VIC-II, 50 Hz).
    #[default]
    C64Pal,
    /// NTSC C64 (6567 VIC-II, 60 Hz).
    C64Ntsc,
}

impl C64Model {
    /// Vertical refresh rate in Hz.
    #[must_use]
    pub const fn refresh_hz(self) -> u32 {
        match self {
            C64Model::C64Pal => 50,
            C64Model::C64Ntsc => 60,
        }
    }
}

/// Scheduling granularity.
///
/// Fixed for a running session; switching requires a hard reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmulationMode {
    /// Every chip advances one clock cycle per step.
    #[default]
    CycleExact,
    /// Chips advance one raster line per step; processors run whole
    /// instructions.
    LineBased,
}

impl EmulationMode {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EmulationMode::CycleExact => "cycle_exact",
            EmulationMode::LineBased => "line_based",
        }
    }
}

/// Drive processor cycles per raster line in line-based mode.
pub const DEFAULT_DRIVE_CYCLES_PER_LINE: u32 = 64;

/// Configuration for a C64 session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmuConfig {
    /// Model variant.
    pub model: C64Model,
    /// Scheduling granularity.
    pub mode: EmulationMode,
    /// Emulate the 1541 drive processor.
    pub drive_emulation: bool,
    /// Disk image mounted in the drive.
    pub drive_path: String,
    /// Drive processor budget per line in line-based mode. Independent of
    /// video timing.
    pub drive_cycles_per_line: u32,
    /// Frames skipped between drawn frames (0 = draw every frame).
    pub skip_frames: u32,
    /// Pace emulation to real time.
    pub limit_speed: bool,
    /// Target refresh rate in Hz. `None` uses the model's rate.
    pub refresh_hz: Option<u32>,
}

impl Default for EmuConfig {
    fn default() -> Self {
        Self {
            model: C64Model::C64Pal,
            mode: EmulationMode::CycleExact,
            drive_emulation: false,
            drive_path: String::new(),
            drive_cycles_per_line: DEFAULT_DRIVE_CYCLES_PER_LINE,
            skip_frames: 0,
            limit_speed: true,
            refresh_hz: None,
        }
    }
}

impl EmuConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("can't read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Effective refresh rate in Hz.
    #[must_use]
    pub fn refresh_hz(&self) -> u32 {
        self.refresh_hz.unwrap_or_else(|| self.model.refresh_hz())
    }

    /// Reject values the scheduler and governor can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_hz() == 0 || self.refresh_hz() > 1000 {
            return Err(Error::Configuration(format!(
                "refresh rate {} Hz out of range",
                self.refresh_hz()
            )));
        }
        if self.drive_cycles_per_line == 0 {
            return Err(Error::Configuration(
                "drive cycles per line must be non-zero".into(),
            ));
        }
        if self.drive_path.len() >= DRIVE_PATH_LEN {
            return Err(Error::Configuration(format!(
                "drive path longer than {} bytes",
                DRIVE_PATH_LEN - 1
            )));
        }
        Ok(())
    }
}
