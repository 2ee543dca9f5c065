//! Snapshot file format.
//!
//! | Field                  | Size      | Notes                           |
//! |------------------------|-----------|---------------------------------|
//! | magic                  | 12        | `"C64Snapshot\n"`               |
//! | version                | 1         | 0                               |
//! | flags                  | 1         | bit 0: drive section present    |
//! | VIC-II state           | blob      |                                 |
//! | SID state              | blob      |                                 |
//! | CIA 1 state            | blob      |                                 |
//! | CIA 2 state            | blob      |                                 |
//! | 6510 state             | blob      |                                 |
//! | 6510 delay             | 1         | cycles the 6510 is ahead        |
//! | drive image path       | 256       | NUL padded; drive section only  |
//! | 1541 processor state   | blob      | drive section only              |
//! | 1541 delay             | 1         | drive section only              |
//! | disk-job state         | blob      | drive section only              |
//!
//! Blobs use the [`ChipState`] framing. Parsing reads the whole file
//! before anything is applied, so a bad file never touches live state.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use emu_core::ChipState;

use crate::error::SnapshotError;

/// File magic.
pub const MAGIC: &[u8; 12] = b"C64Snapshot\n";

/// The only format version understood.
pub const VERSION: u8 = 0;

/// Flags bit: a drive section follows the main processor.
pub const FLAG_DRIVE: u8 = 0x01;

/// Fixed size of the drive image path field.
pub const DRIVE_PATH_LEN: usize = 256;

/// State of the drive unit at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveSnapshot {
    /// Disk image mounted when the snapshot was taken.
    pub path: String,
    pub cpu: ChipState,
    /// Cycles the rest of the machine must be advanced after restoring
    /// to reach the drive processor's capture instant.
    pub delay: u8,
    pub job: ChipState,
}

/// A parsed snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub video: ChipState,
    pub audio: ChipState,
    pub timer1: ChipState,
    pub timer2: ChipState,
    pub cpu: ChipState,
    /// Cycles the peripherals must be advanced after restoring to reach
    /// the main processor's capture instant.
    pub cpu_delay: u8,
    pub drive: Option<DriveSnapshot>,
}

impl Snapshot {
    #[must_use]
    pub fn flags(&self) -> u8 {
        if self.drive.is_some() { FLAG_DRIVE } else { 0 }
    }

    /// Serialize in the fixed field order.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&[VERSION, self.flags()])?;
        self.video.write_to(w)?;
        self.audio.write_to(w)?;
        self.timer1.write_to(w)?;
        self.timer2.write_to(w)?;
        self.cpu.write_to(w)?;
        w.write_all(&[self.cpu_delay])?;

        if let Some(drive) = &self.drive {
            w.write_all(&encode_path(&drive.path)?)?;
            drive.cpu.write_to(w)?;
            w.write_all(&[drive.delay])?;
            drive.job.write_to(w)?;
        }
        Ok(())
    }

    /// Parse a complete snapshot.
    ///
    /// The version byte is checked before any chip state is read.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, SnapshotError> {
        let mut magic = [0u8; MAGIC.len()];
        r.read_exact(&mut magic).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => SnapshotError::NotASnapshot,
            _ => truncated("header")(e),
        })?;
        if &magic != MAGIC {
            return Err(SnapshotError::NotASnapshot);
        }

        let version = read_u8(r, "version")?;
        if version != VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        let flags = read_u8(r, "flags")?;

        let video = read_state(r, "VIC-II state")?;
        let audio = read_state(r, "SID state")?;
        let timer1 = read_state(r, "CIA 1 state")?;
        let timer2 = read_state(r, "CIA 2 state")?;
        let cpu = read_state(r, "6510 state")?;
        let cpu_delay = read_u8(r, "6510 delay")?;

        let drive = if flags & FLAG_DRIVE != 0 {
            let mut path = [0u8; DRIVE_PATH_LEN];
            r.read_exact(&mut path).map_err(truncated("drive path"))?;
            let path = decode_path(&path)?;
            let cpu = read_state(r, "1541 state")?;
            let delay = read_u8(r, "1541 delay")?;
            let job = read_state(r, "disk job state")?;
            Some(DriveSnapshot {
                path,
                cpu,
                delay,
                job,
            })
        } else {
            None
        };

        Ok(Self {
            video,
            audio,
            timer1,
            timer2,
            cpu,
            cpu_delay,
            drive,
        })
    }

    /// Write to a file.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let file = File::create(path).map_err(|source| SnapshotError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w).map_err(SnapshotError::Write)?;
        w.flush().map_err(SnapshotError::Write)
    }

    /// Read from a file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path).map_err(|source| SnapshotError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read_from(&mut BufReader::new(file))
    }
}

fn truncated(field: &'static str) -> impl Fn(io::Error) -> SnapshotError {
    move |_| SnapshotError::Truncated { field }
}

fn read_u8<R: Read>(r: &mut R, field: &'static str) -> Result<u8, SnapshotError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(truncated(field))?;
    Ok(b[0])
}

fn read_state<R: Read>(r: &mut R, field: &'static str) -> Result<ChipState, SnapshotError> {
    ChipState::read_from(r).map_err(truncated(field))
}

fn encode_path(path: &str) -> io::Result<[u8; DRIVE_PATH_LEN]> {
    let bytes = path.as_bytes();
    if bytes.len() >= DRIVE_PATH_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "drive path does not fit the snapshot field",
        ));
    }
    let mut out = [0u8; DRIVE_PATH_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn decode_path(raw: &[u8; DRIVE_PATH_LEN]) -> Result<String, SnapshotError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|_| SnapshotError::InvalidDrivePath)
}
