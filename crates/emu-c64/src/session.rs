//! The emulation thread and its control surface.
//!
//! [`Session::spawn`] moves a [`C64`] onto its own thread. From then on
//! the control side talks to it two ways: pause, resume and quit are plain
//! flags on the shared [`RunState`], observed by the cycle loop on every
//! cycle; everything that needs the machine itself (reset, configuration,
//! snapshots) goes over a command channel and is handled between frames.
//!
//! A pause in cycle-exact mode stops the cycle loop at once; the thread
//! then runs on to the end of the frame before it parks, so a paused
//! machine always sits on a save point. Saves and loads keep it on one.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info};

use crate::c64::C64;
use crate::config::{EmuConfig, EmulationMode};
use crate::error::{Error, Result, SnapshotError};
use crate::run_state::RunState;

/// How long a paused thread waits for a command before checking the
/// flags again.
const PARK_POLL: Duration = Duration::from_millis(10);

type Reply<T> = Sender<std::result::Result<T, SnapshotError>>;

enum Command {
    Reset,
    Nmi,
    ApplyConfig(EmuConfig, Sender<Result<()>>),
    SetMode(EmulationMode, Sender<Result<()>>),
    SaveSnapshot(PathBuf, Reply<()>),
    LoadSnapshot(PathBuf, Reply<()>),
}

/// Handle to a running emulation thread.
pub struct Session {
    run_state: Arc<RunState>,
    commands: Sender<Command>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl Session {
    /// Start emulating `c64` on a new thread.
    ///
    /// Attach the display and the governor before spawning; their
    /// consumer-side handles stay with the caller.
    pub fn spawn(c64: C64) -> Result<Self> {
        let run_state = c64.run_state();
        let (commands, inbox) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("emulation".into())
            .spawn(move || run(c64, &inbox))
            .map_err(Error::Thread)?;

        Ok(Self {
            run_state,
            commands,
            thread: Some(thread),
        })
    }

    #[must_use]
    pub fn run_state(&self) -> Arc<RunState> {
        Arc::clone(&self.run_state)
    }

    /// Pause at the end of the current frame. Idempotent.
    pub fn pause(&self) {
        self.run_state.request_pause();
    }

    pub fn resume(&self) {
        self.run_state.resume();
    }

    /// Stop the thread; collect its result with [`join`](Self::join).
    pub fn quit(&self) {
        self.run_state.request_quit();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Hard reset.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Non-maskable interrupt (RESTORE key).
    pub fn nmi(&self) -> Result<()> {
        self.send(Command::Nmi)
    }

    /// Replace the configuration. Waits for the emulation thread.
    pub fn apply_config(&self, config: EmuConfig) -> Result<()> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::ApplyConfig(config, reply))?;
        answer.recv().map_err(|_| Error::Stopped)?
    }

    /// Switch emulation mode; the session must be paused.
    pub fn set_mode(&self, mode: EmulationMode) -> Result<()> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::SetMode(mode, reply))?;
        answer.recv().map_err(|_| Error::Stopped)?
    }

    /// Save a snapshot; the session must be paused.
    pub fn save_snapshot(&self, path: impl Into<PathBuf>) -> Result<()> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::SaveSnapshot(path.into(), reply))?;
        Ok(answer.recv().map_err(|_| Error::Stopped)??)
    }

    /// Load a snapshot; the session must be paused.
    pub fn load_snapshot(&self, path: impl Into<PathBuf>) -> Result<()> {
        let (reply, answer) = mpsc::channel();
        self.send(Command::LoadSnapshot(path.into(), reply))?;
        Ok(answer.recv().map_err(|_| Error::Stopped)??)
    }

    /// Wait for the thread to end. A chip fault that halted it is
    /// returned here.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Error::Stopped)?,
            None => Ok(()),
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Stopped)?;
        // Wake a running cycle loop so the command is seen promptly.
        self.run_state.signal_state_change();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.run_state.request_quit();
            let _ = thread.join();
        }
    }
}

fn run(mut c64: C64, inbox: &Receiver<Command>) -> Result<()> {
    let run_state = c64.run_state();
    info!("emulation thread started in {} mode", c64.mode().name());

    let mut parked = false;
    loop {
        if run_state.quit_requested() {
            break;
        }

        if run_state.pause_requested() {
            if !parked {
                c64.pause();
                c64.finish_frame()?;
                parked = true;
            }
            match inbox.recv_timeout(PARK_POLL) {
                Ok(command) => handle(&mut c64, command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }

        if parked {
            c64.resume();
            parked = false;
        }
        while let Ok(command) = inbox.try_recv() {
            handle(&mut c64, command);
        }
        c64.run_frame()?;
    }

    info!("emulation thread stopped after {} frames", c64.frame_count());
    match c64.fault() {
        Some(fault) => Err(Error::ChipFault(fault.clone())),
        None => Ok(()),
    }
}

/// Replies go to a caller that may have given up waiting.
fn handle(c64: &mut C64, command: Command) {
    match command {
        Command::Reset => c64.reset(),
        Command::Nmi => c64.nmi(),
        Command::ApplyConfig(config, reply) => {
            debug!("applying configuration");
            let _ = reply.send(c64.apply_config(config));
        }
        Command::SetMode(mode, reply) => {
            let _ = reply.send(c64.set_mode(mode));
        }
        Command::SaveSnapshot(path, reply) => {
            // A failed save can leave a paused machine mid-frame.
            if c64.is_paused() && c64.finish_frame().is_err() {
                let _ = reply.send(Err(SnapshotError::NotAtFrameBoundary));
                return;
            }
            let _ = reply.send(c64.save_snapshot_to(&path));
        }
        Command::LoadSnapshot(path, reply) => {
            let _ = reply.send(c64.load_snapshot_from(&path));
        }
    }
}
