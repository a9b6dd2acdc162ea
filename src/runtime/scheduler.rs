//! Frame pacing for callback-driven programs.
//!
//! The scheduler is polled on every host tick. A frame is accepted once at
//! least one frame interval has elapsed; the reference time then advances
//! with the remainder carried forward so pacing does not drift.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source in milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;

    /// Blocks for `ms` milliseconds of this clock's time.
    fn sleep_ms(&self, ms: f64);
}

/// Wall clock measured from construction.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn sleep_ms(&self, ms: f64) {
        if ms > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(ms / 1000.0));
        }
    }
}

/// Virtual clock for deterministic runs. Time only moves when advanced
/// (or when something sleeps on it). Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ms(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: f64) {
        if ms > 0.0 {
            self.advance_ms(ms);
        }
    }
}

/// What one scheduler poll decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Not enough time has passed since the last accepted frame.
    Idle,
    /// A frame is due; the callback receives `delta_seconds`.
    Frame { delta_seconds: f64 },
}

/// Rounding slack when comparing elapsed time against the interval.
const TOLERANCE_MS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct FrameScheduler {
    target_fps: f64,
    last_frame: f64,
    window_start: f64,
    window_frames: u32,
    fps: f64,
}

impl FrameScheduler {
    pub fn new(target_fps: f64, now: f64) -> Self {
        Self {
            target_fps: sanitize_fps(target_fps),
            last_frame: now,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn set_target_fps(&mut self, fps: f64) {
        self.target_fps = sanitize_fps(fps);
    }

    /// Milliseconds between frames.
    pub fn interval_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }

    /// Frames per second measured over the last full one-second window.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Milliseconds until the next frame is due, zero when already due.
    pub fn until_next_ms(&self, now: f64) -> f64 {
        (self.interval_ms() - (now - self.last_frame)).max(0.0)
    }

    pub fn poll(&mut self, now: f64) -> Tick {
        let interval = self.interval_ms();
        let elapsed = now - self.last_frame;
        if elapsed + TOLERANCE_MS < interval {
            return Tick::Idle;
        }

        self.window_frames += 1;
        if now - self.window_start >= 1000.0 {
            self.fps = (self.window_frames as f64 * 1000.0 / (now - self.window_start)).round();
            self.window_frames = 0;
            self.window_start = now;
        }

        let carried = if elapsed >= interval { elapsed % interval } else { 0.0 };
        self.last_frame = now - carried;
        Tick::Frame {
            delta_seconds: elapsed / 1000.0,
        }
    }
}

fn sanitize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 { fps } else { 60.0 }
}
