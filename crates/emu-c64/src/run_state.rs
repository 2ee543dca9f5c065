//! Control flags shared between the control surface and the emulation
//! thread.
//!
//! The cycle-exact loop polls `state_change` once per cycle, so every
//! request that must interrupt it (pause, quit) also raises that flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// Quit, pause and state-change flags.
#[derive(Debug, Default)]
pub struct RunState {
    quit: AtomicBool,
    pause: AtomicBool,
    state_change: AtomicBool,
}

impl RunState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the emulation thread to stop.
    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
        self.state_change.store(true, Ordering::Release);
    }

    /// Ask the emulation thread to pause. Idempotent.
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::Release);
        self.state_change.store(true, Ordering::Release);
    }

    /// Let a paused emulation thread continue.
    pub fn resume(&self) {
        self.pause.store(false, Ordering::Release);
    }

    /// Interrupt the cycle-exact loop without pausing or quitting.
    pub fn signal_state_change(&self) {
        self.state_change.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state_changed(&self) -> bool {
        self.state_change.load(Ordering::Acquire)
    }

    /// Acknowledge a state change after the cycle loop has yielded.
    pub fn clear_state_change(&self) {
        self.state_change.store(false, Ordering::Release);
    }
}
