//! The host runtime: one drawing surface, one input queue, one frame
//! scheduler. A single instance lives for the whole application and is
//! handed to every run explicitly.

pub mod geometry;
pub mod input;
pub mod scheduler;
pub mod surface;

use crate::config::RuntimeConfig;
use crate::grammar::Value;
use input::{InputEvent, InputHandle, InputScript, KeySnapshot, Pointer};
use log::{debug, info};
use scheduler::{Clock, FrameScheduler, SystemClock, Tick};
use surface::{DrawCommand, HeadlessSurface, Surface};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Cannot draw before game.init() is called")]
    Uninitialized,

    #[error("Invalid surface size {width}x{height}")]
    InvalidSize { width: f64, height: f64 },
}

/// Outcome of polling the frame scheduler.
#[derive(Debug, Clone)]
pub enum FrameDue {
    Idle,
    /// A frame was due but the runtime is paused.
    Skipped,
    Run { callback: Value, delta_seconds: f64 },
}

pub struct HostRuntime {
    running: bool,
    paused: bool,
    initialized: bool,
    title: String,
    size: (u32, u32),
    surface: Box<dyn Surface>,
    frame: Vec<DrawCommand>,
    last_frame: Vec<DrawCommand>,
    input: InputHandle,
    script: Option<InputScript>,
    scheduler: FrameScheduler,
    clock: Box<dyn Clock>,
    callback: Option<Value>,
    frames: u64,
    last_present: f64,
    settings: RuntimeConfig,
}

impl HostRuntime {
    pub fn new(surface: Box<dyn Surface>, clock: Box<dyn Clock>, settings: RuntimeConfig) -> Self {
        let now = clock.now_ms();
        Self {
            running: false,
            paused: false,
            initialized: false,
            title: String::new(),
            size: (settings.width, settings.height),
            surface,
            frame: Vec::new(),
            last_frame: Vec::new(),
            input: InputHandle::new(),
            script: None,
            scheduler: FrameScheduler::new(settings.default_fps, now),
            clock,
            callback: None,
            frames: 0,
            last_present: now,
            settings,
        }
    }

    /// Headless surface on the system clock.
    pub fn headless(settings: RuntimeConfig) -> Self {
        Self::new(
            Box::new(HeadlessSurface::new()),
            Box::new(SystemClock::new()),
            settings,
        )
    }

    // ---------- state ----------

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn has_frame_loop(&self) -> bool {
        self.running && self.callback.is_some()
    }

    pub fn fps(&self) -> f64 {
        self.scheduler.fps()
    }

    pub fn target_fps(&self) -> f64 {
        self.scheduler.target_fps()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Frames presented since the current run started.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn settings(&self) -> &RuntimeConfig {
        &self.settings
    }

    /// Display list being recorded for the next frame.
    pub fn pending_frame(&self) -> &[DrawCommand] {
        &self.frame
    }

    pub fn last_frame(&self) -> &[DrawCommand] {
        &self.last_frame
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    // ---------- lifecycle ----------

    /// Sets up the surface. Returns false when no surface is available.
    pub fn init(&mut self, width: f64, height: f64, title: &str) -> Result<bool, RuntimeError> {
        let valid = |v: f64| v.is_finite() && v >= 1.0 && v <= u32::MAX as f64;
        if !valid(width) || !valid(height) {
            return Err(RuntimeError::InvalidSize { width, height });
        }
        let (w, h) = (width as u32, height as u32);
        if !self.surface.configure(w, h, title) {
            return Ok(false);
        }
        self.size = (w, h);
        self.title = title.to_string();
        self.initialized = true;
        self.running = true;
        info!("game initialized: {w}x{h} \"{title}\"");
        Ok(true)
    }

    /// Begins the scheduler-driven loop around `callback`.
    pub fn start(&mut self, callback: Value, fps: Option<f64>) {
        let fps = fps.unwrap_or(self.settings.default_fps);
        self.scheduler = FrameScheduler::new(fps, self.clock.now_ms());
        self.callback = Some(callback);
        self.running = true;
        info!("frame loop started at {} fps", self.scheduler.target_fps());
    }

    /// Halts any loop and releases every held key.
    pub fn stop(&mut self) {
        if self.running || self.callback.is_some() {
            info!("game stopped after {} frame(s)", self.frames);
        }
        self.running = false;
        self.callback = None;
        self.input.release_keys();
    }

    pub fn pause(&mut self) {
        self.paused = !self.paused;
        debug!("paused = {}", self.paused);
    }

    /// Called before a new run: stops the previous loop and drops its input.
    pub fn prepare_run(&mut self) {
        self.stop();
        self.input.reset();
        self.paused = false;
        self.frames = 0;
        self.last_present = self.clock.now_ms();
        if let Some(script) = &self.script {
            script.apply(0, &self.input);
        }
    }

    // ---------- frames ----------

    /// Frame boundary for programs with their own loop. Presents the frame
    /// and, when pacing is enabled, waits out the rest of the frame interval.
    pub fn update(&mut self, fps: Option<f64>) {
        if let Some(fps) = fps.filter(|f| *f > 0.0) {
            self.scheduler.set_target_fps(fps);
        }
        self.end_frame(self.settings.pace_updates);
    }

    pub fn end_frame(&mut self, pace: bool) {
        if pace {
            let wait = self.scheduler.interval_ms() - (self.clock.now_ms() - self.last_present);
            self.clock.sleep_ms(wait);
        }
        self.surface.present(&self.frame);
        self.last_frame = std::mem::take(&mut self.frame);
        self.last_present = self.clock.now_ms();
        self.frames += 1;

        if let Some(script) = &self.script {
            script.apply(self.frames, &self.input);
        }
        if let Some(max) = self.settings.max_frames {
            if self.frames >= max && self.running {
                debug!("frame budget of {max} reached");
                self.stop();
            }
        }
    }

    /// Shows the last presented frame again while paused. Not counted as a
    /// frame: scripted input and the frame budget stay where they are.
    pub fn present_paused(&mut self) {
        self.surface.present(&self.last_frame);
    }

    /// Polls the scheduler once.
    pub fn poll_frame(&mut self) -> FrameDue {
        let Some(callback) = self.callback.clone().filter(|_| self.running) else {
            return FrameDue::Idle;
        };
        match self.scheduler.poll(self.clock.now_ms()) {
            Tick::Idle => FrameDue::Idle,
            Tick::Frame { .. } if self.paused => FrameDue::Skipped,
            Tick::Frame { delta_seconds } => FrameDue::Run {
                callback,
                delta_seconds,
            },
        }
    }

    /// Sleeps until the scheduler's next frame is due.
    pub fn wait_for_frame(&mut self) {
        let wait = self.scheduler.until_next_ms(self.clock.now_ms());
        self.clock.sleep_ms(wait);
    }

    // ---------- drawing ----------

    pub fn draw(&mut self, command: DrawCommand) -> Result<(), RuntimeError> {
        if !self.initialized {
            return Err(RuntimeError::Uninitialized);
        }
        self.frame.push(command);
        Ok(())
    }

    // ---------- input ----------

    /// Drains the event queue.
    pub fn events(&mut self) -> Vec<InputEvent> {
        self.input.drain_events()
    }

    /// Non-draining view of the named keys.
    pub fn get_keys(&self) -> KeySnapshot {
        self.input.keys()
    }

    pub fn pointer(&self) -> Pointer {
        self.input.pointer()
    }

    /// Copy of the live key map, keyed by lowercased key and code.
    pub fn raw_keys(&self) -> Vec<(String, bool)> {
        self.input.raw_keys()
    }

    /// Producer handle for input listeners.
    pub fn input_handle(&self) -> InputHandle {
        self.input.clone()
    }

    pub fn set_input_script(&mut self, script: InputScript) {
        self.script = Some(script);
    }
}

#[cfg(test)]
mod tests {
    use super::scheduler::ManualClock;
    use super::surface::Color;
    use super::*;

    fn runtime(settings: RuntimeConfig) -> (HostRuntime, ManualClock) {
        let clock = ManualClock::new();
        let rt = HostRuntime::new(
            Box::new(HeadlessSurface::new()),
            Box::new(clock.clone()),
            settings,
        );
        (rt, clock)
    }

    #[test]
    fn drawing_requires_init() {
        let (mut rt, _) = runtime(RuntimeConfig::default());
        assert_eq!(
            rt.draw(DrawCommand::Clear(Color::BLACK)),
            Err(RuntimeError::Uninitialized)
        );
        assert_eq!(rt.init(320.0, 200.0, "t"), Ok(true));
        assert!(rt.is_running());
        assert!(rt.draw(DrawCommand::Clear(Color::BLACK)).is_ok());
    }

    #[test]
    fn init_rejects_nonsense_sizes() {
        let (mut rt, _) = runtime(RuntimeConfig::default());
        assert!(matches!(
            rt.init(f64::NAN, 10.0, "x"),
            Err(RuntimeError::InvalidSize { .. })
        ));
    }

    #[test]
    fn frame_budget_stops_the_runtime() {
        let settings = RuntimeConfig {
            max_frames: Some(3),
            ..RuntimeConfig::default()
        };
        let (mut rt, _) = runtime(settings);
        rt.init(100.0, 100.0, "t").expect("init");
        rt.update(None);
        rt.update(None);
        assert!(rt.is_running());
        rt.update(None);
        assert!(!rt.is_running());
        assert_eq!(rt.frames(), 3);
    }

    #[test]
    fn paced_update_waits_out_the_interval() {
        let settings = RuntimeConfig {
            pace_updates: true,
            ..RuntimeConfig::default()
        };
        let (mut rt, clock) = runtime(settings);
        rt.update(Some(10.0));
        assert_eq!(clock.now_ms(), 100.0);
        clock.advance_ms(30.0);
        rt.update(None);
        assert_eq!(clock.now_ms(), 200.0);
    }

    #[test]
    fn scheduler_runs_callback_only_when_due() {
        let (mut rt, clock) = runtime(RuntimeConfig::default());
        rt.start(Value::Null, Some(10.0));
        assert!(matches!(rt.poll_frame(), FrameDue::Idle));
        clock.advance_ms(100.0);
        assert!(matches!(rt.poll_frame(), FrameDue::Run { .. }));
        rt.pause();
        clock.advance_ms(100.0);
        assert!(matches!(rt.poll_frame(), FrameDue::Skipped));
    }

    #[test]
    fn stop_clears_keys_and_callback() {
        let (mut rt, _) = runtime(RuntimeConfig::default());
        let producer = rt.input_handle();
        rt.start(Value::Null, None);
        producer.key_down("ArrowUp", "ArrowUp");
        assert!(rt.get_keys().up);
        rt.stop();
        assert!(!rt.get_keys().up);
        assert!(!rt.has_frame_loop());
        assert!(matches!(rt.poll_frame(), FrameDue::Idle));
    }

    #[test]
    fn prepare_run_discards_queued_events() {
        let (mut rt, _) = runtime(RuntimeConfig::default());
        rt.input_handle().key_down("a", "KeyA");
        rt.prepare_run();
        assert!(rt.events().is_empty());
    }

    #[test]
    fn present_moves_frame_to_last_frame() {
        let (mut rt, _) = runtime(RuntimeConfig::default());
        rt.init(10.0, 10.0, "t").expect("init");
        rt.draw(DrawCommand::Clear(Color::WHITE)).expect("draw");
        rt.end_frame(false);
        assert!(rt.pending_frame().is_empty());
        assert_eq!(rt.last_frame(), &[DrawCommand::Clear(Color::WHITE)]);
    }
}
