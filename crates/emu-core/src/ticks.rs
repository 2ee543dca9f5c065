//! Elapsed-cycle counting.

/// A count of elapsed clock cycles.
///
/// Only cycle-exact scheduling advances it one cycle at a time; it exists
/// for diagnostics and deterministic seeking and restarts at zero with
/// every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Count one more cycle.
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    /// Back to zero.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

impl core::ops::Sub for Ticks {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl core::fmt::Display for Ticks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} cycles", self.0)
    }
}
