//! Speed governor: paces emulated frames against wall-clock time.
//!
//! After each frame the governor measures how long the frame took,
//! derives a speed percentage, and (when limiting) sleeps until the next
//! frame deadline. Deadlines advance by one frame interval; if the clock
//! has already passed the new deadline the deadline snaps to "now", so a
//! stall costs at most one frame of drift instead of compounding.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Speed reported when a frame took no measurable time.
pub const MAX_SPEED_PERCENT: u32 = 999;

/// How often the frames-per-second figure is sampled.
pub const FPS_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// A monotonic time source.
pub trait Clock: Send {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to. Sleeping advances it.
///
/// Clones share the same time, so a test can keep one handle and give
/// the other to the governor.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Figures published for the presentation thread.
///
/// Written by the emulation thread once per frame (speed) and once per
/// second (fps); read from anywhere.
#[derive(Debug, Default)]
pub struct SpeedStats {
    speed_percent: AtomicU32,
    fps_millis: AtomicU32,
    sampled: AtomicBool,
}

impl SpeedStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Speed of the last frame, in percent of real time.
    #[must_use]
    pub fn speed_percent(&self) -> u32 {
        self.speed_percent.load(Ordering::Relaxed)
    }

    /// Frames per second over the last sample interval, if one has
    /// completed.
    #[must_use]
    pub fn fps(&self) -> Option<f64> {
        self.sampled
            .load(Ordering::Acquire)
            .then(|| f64::from(self.fps_millis.load(Ordering::Relaxed)) / 1000.0)
    }

    fn publish_speed(&self, speed: u32) {
        self.speed_percent.store(speed, Ordering::Relaxed);
    }

    fn publish_fps(&self, fps: f64) {
        let millis = (fps * 1000.0).round().clamp(0.0, f64::from(u32::MAX)) as u32;
        self.fps_millis.store(millis, Ordering::Relaxed);
        self.sampled.store(true, Ordering::Release);
    }
}

/// Per-frame timing result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Emulation speed for this frame, percent of real time.
    pub speed_percent: u32,
    /// New frames-per-second sample, once per [`FPS_SAMPLE_INTERVAL`].
    pub fps: Option<f64>,
}

/// Paces frames to real time and measures achieved speed.
pub struct SpeedGovernor {
    clock: Box<dyn Clock>,
    frame_interval: Duration,
    limit_speed: bool,
    frame_start: Duration,
    next_deadline: Duration,
    sample_start: Duration,
    frames_since_sample: u32,
    stats: Arc<SpeedStats>,
}

impl SpeedGovernor {
    /// A governor for `refresh_hz` frames per second, started now.
    ///
    /// The frame interval is whole milliseconds (20 ms at 50 Hz).
    #[must_use]
    pub fn new(clock: Box<dyn Clock>, refresh_hz: u32, limit_speed: bool) -> Self {
        let mut governor = Self {
            clock,
            frame_interval: frame_interval(refresh_hz),
            limit_speed,
            frame_start: Duration::ZERO,
            next_deadline: Duration::ZERO,
            sample_start: Duration::ZERO,
            frames_since_sample: 0,
            stats: Arc::new(SpeedStats::new()),
        };
        governor.restart();
        governor
    }

    /// Reset the frame clock, e.g. after a pause.
    pub fn restart(&mut self) {
        let now = self.clock.now();
        self.frame_start = now;
        self.next_deadline = now + self.frame_interval;
        self.sample_start = now;
        self.frames_since_sample = 0;
    }

    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    #[must_use]
    pub fn next_deadline(&self) -> Duration {
        self.next_deadline
    }

    #[must_use]
    pub fn limit_speed(&self) -> bool {
        self.limit_speed
    }

    pub fn set_limit_speed(&mut self, limit: bool) {
        self.limit_speed = limit;
    }

    /// Change the target frame rate; pacing restarts from now.
    pub fn set_refresh_hz(&mut self, refresh_hz: u32) {
        self.frame_interval = frame_interval(refresh_hz);
        self.restart();
    }

    /// Shared handle to the published figures.
    #[must_use]
    pub fn stats(&self) -> Arc<SpeedStats> {
        Arc::clone(&self.stats)
    }

    /// Record the end of a frame, and sleep until its deadline when
    /// limiting.
    pub fn end_frame(&mut self) -> FrameTiming {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(self.frame_start);

        let mut speed_percent = speed_percent(self.frame_interval, elapsed);

        if self.limit_speed {
            if now <= self.next_deadline {
                self.clock.sleep(self.next_deadline - now);
            }
            self.next_deadline += self.frame_interval;
            if self.next_deadline < now {
                self.next_deadline = now;
            }
            speed_percent = speed_percent.min(100);
        }
        self.stats.publish_speed(speed_percent);

        self.frames_since_sample += 1;
        let since_sample = now.saturating_sub(self.sample_start);
        let fps = if since_sample >= FPS_SAMPLE_INTERVAL {
            let fps = f64::from(self.frames_since_sample) / since_sample.as_secs_f64();
            self.stats.publish_fps(fps);
            self.sample_start = now;
            self.frames_since_sample = 0;
            Some(fps)
        } else {
            None
        };

        self.frame_start = self.clock.now();

        FrameTiming { speed_percent, fps }
    }
}

fn frame_interval(refresh_hz: u32) -> Duration {
    Duration::from_millis(u64::from(1000 / refresh_hz.max(1)))
}

/// `interval * 100 / elapsed`, with zero elapsed time counting as as
/// fast as can be reported.
fn speed_percent(interval: Duration, elapsed: Duration) -> u32 {
    let elapsed = elapsed.as_micros();
    if elapsed == 0 {
        return MAX_SPEED_PERCENT;
    }
    let speed = interval.as_micros() * 100 / elapsed;
    speed.min(u128::from(MAX_SPEED_PERCENT)) as u32
}
