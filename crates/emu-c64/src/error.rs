//! Error types for the C64 orchestrator.

use std::io;
use std::path::PathBuf;

use emu_core::{ChipFault, StateError};

/// Top-level error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration or missing chip resources. Fatal at start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Snapshot save or load failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// A chip reported an internal inconsistency. Fatal to the run.
    #[error(transparent)]
    ChipFault(#[from] ChipFault),

    /// The emulation thread couldn't be started.
    #[error("can't start emulation thread: {0}")]
    Thread(#[source] io::Error),

    /// The emulation thread is gone.
    #[error("emulation thread has stopped")]
    Stopped,
}

/// How a caller should react to a failed snapshot operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Transient: fix the precondition or the file system and try again.
    Retry,
    /// The file is unusable; tell the user. Live state is untouched.
    Report,
    /// Live state became inconsistent and the machine has been hard reset.
    Reset,
}

/// Snapshot failure, with distinguishable reasons.
#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("can't open snapshot {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't write snapshot: {0}")]
    Write(#[source] io::Error),

    #[error("not a snapshot file")]
    NotASnapshot,

    #[error("snapshot truncated while reading {field}")]
    Truncated { field: &'static str },

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),

    /// The drive image path is not valid UTF-8.
    #[error("snapshot drive path is not valid text")]
    InvalidDrivePath,

    /// The processor never reached an instruction boundary within the
    /// representable delay.
    #[error("{processor} did not reach an instruction boundary")]
    Unresolved { processor: &'static str },

    #[error("invalid {chip} state: {source}")]
    InvalidState {
        chip: &'static str,
        #[source]
        source: StateError,
    },

    /// A chip faulted while being stepped for alignment or catch-up.
    #[error("fault during catch-up: {0}")]
    CatchUp(#[source] ChipFault),

    #[error("emulation must be paused")]
    NotPaused,

    #[error("emulation is not at a frame boundary or snapshot instant")]
    NotAtFrameBoundary,

    /// Applying the snapshot's drive configuration failed.
    #[error("can't apply snapshot configuration: {0}")]
    Configuration(String),
}

impl SnapshotError {
    /// Malformed data or an unresolvable processor state.
    #[must_use]
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            SnapshotError::NotASnapshot
                | SnapshotError::Truncated { .. }
                | SnapshotError::InvalidDrivePath
                | SnapshotError::Unresolved { .. }
                | SnapshotError::InvalidState { .. }
        )
    }

    /// Suggested reaction for the caller.
    #[must_use]
    pub fn recovery(&self) -> Recovery {
        match self {
            SnapshotError::Open { .. }
            | SnapshotError::Write(_)
            | SnapshotError::NotPaused
            | SnapshotError::NotAtFrameBoundary => Recovery::Retry,
            SnapshotError::NotASnapshot
            | SnapshotError::Truncated { .. }
            | SnapshotError::UnsupportedVersion(_)
            | SnapshotError::InvalidDrivePath
            | SnapshotError::Unresolved { .. } => Recovery::Report,
            SnapshotError::InvalidState { .. }
            | SnapshotError::CatchUp(_)
            | SnapshotError::Configuration(_) => Recovery::Reset,
        }
    }
}

/// Result type for C64 operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_are_reported_not_reset() {
        let err = SnapshotError::Truncated { field: "video" };
        assert!(err.is_corrupt());
        assert_eq!(err.recovery(), Recovery::Report);
        assert_eq!(
            SnapshotError::UnsupportedVersion(9).recovery(),
            Recovery::Report
        );
        assert!(!SnapshotError::UnsupportedVersion(9).is_corrupt());
    }

    #[test]
    fn apply_failures_force_reset() {
        let err = SnapshotError::CatchUp(ChipFault::new("vic", "bad raster"));
        assert_eq!(err.recovery(), Recovery::Reset);
        assert_eq!(SnapshotError::NotPaused.recovery(), Recovery::Retry);
    }

    #[test]
    fn chip_fault_converts_to_error() {
        let err: Error = ChipFault::new("cia1", "timer underflow").into();
        assert_eq!(err.to_string(), "cia1 fault: timer underflow");
    }
}
