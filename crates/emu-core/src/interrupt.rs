//! Shared interrupt lines.
//!
//! Chips that drive an interrupt input of another chip do so through an
//! `InterruptLine` handed out when the chip set is wired, never through a
//! pointer into the other chip. A line is wired-OR: any source holding it
//! keeps it asserted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// A wired-OR interrupt line with up to eight independent sources.
///
/// Clones share the same line. Only the emulation thread touches a line,
/// so relaxed ordering is enough; the atomic makes the handle `Send` so a
/// wired chip set can move to its own thread.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    sources: Arc<AtomicU8>,
}

impl InterruptLine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert the line on behalf of source bit `source` (0-7).
    pub fn assert(&self, source: u8) {
        self.sources.fetch_or(1 << (source & 7), Ordering::Relaxed);
    }

    /// Release source bit `source`.
    pub fn release(&self, source: u8) {
        self.sources
            .fetch_and(!(1 << (source & 7)), Ordering::Relaxed);
    }

    /// Drive source bit `source` to the given level.
    pub fn set(&self, source: u8, asserted: bool) {
        if asserted {
            self.assert(source);
        } else {
            self.release(source);
        }
    }

    /// True while any source holds the line.
    #[must_use]
    pub fn is_asserted(&self) -> bool {
        self.sources.load(Ordering::Relaxed) != 0
    }

    /// Bit mask of the sources currently asserting the line.
    #[must_use]
    pub fn sources(&self) -> u8 {
        self.sources.load(Ordering::Relaxed)
    }

    /// Drop every source. Used on hard reset.
    pub fn clear(&self) {
        self.sources.store(0, Ordering::Relaxed);
    }
}
