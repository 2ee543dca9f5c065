//! Chip-level error types.

/// An internal chip inconsistency.
///
/// Fatal to the current run. Schedulers propagate it unmodified and never
/// retry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{chip} fault: {message}")]
pub struct ChipFault {
    /// Name of the chip that reported the fault.
    pub chip: &'static str,
    /// Chip-specific description.
    pub message: String,
}

impl ChipFault {
    pub fn new(chip: &'static str, message: impl Into<String>) -> Self {
        Self {
            chip,
            message: message.into(),
        }
    }
}

/// A state blob that a chip cannot accept.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The blob was produced by a different kind of chip.
    #[error("state tag mismatch: expected {expected:?}, found {found:?}")]
    TagMismatch { expected: [u8; 4], found: [u8; 4] },

    /// The blob layout version is not understood.
    #[error("state version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    /// The payload ended before all fields were read.
    #[error("state payload truncated")]
    Truncated,

    /// The payload decoded but its contents are inconsistent.
    #[error("malformed state: {0}")]
    Malformed(String),
}
