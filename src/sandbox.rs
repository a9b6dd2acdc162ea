//! The execution sandbox: translates a guest program, runs it with the
//! three capability bindings and reports faults to the console.

use crate::capability::{CapabilityBindings, OutputSink, RandomModule};
use crate::compiler::CompiledUnit;
use crate::config::{Config, SandboxConfig};
use crate::console::{ConsoleSink, LineStyle, LogNotifier, NotificationKind, NotificationSink, StdConsole};
use crate::error::Fault;
use crate::grammar::Value;
use crate::project::{ProjectStore, StoreError};
use crate::runtime::{FrameDue, HostRuntime};
use crate::translator::translate;
use crate::vm::VM;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fault(#[from] Fault),
}

/// Output sink that appends to the run's output log and mirrors every line
/// to the console.
struct Mirror<'s> {
    log: &'s mut Vec<String>,
    console: &'s mut dyn ConsoleSink,
}

impl OutputSink for Mirror<'_> {
    fn write_line(&mut self, line: &str) {
        self.log.push(line.to_string());
        self.console.write(LineStyle::Log, line);
    }
}

pub struct Sandbox {
    runtime: HostRuntime,
    random: RandomModule,
    output: Vec<String>,
    imports: BTreeSet<String>,
    globals: HashMap<String, Value>,
    console: Box<dyn ConsoleSink>,
    notifier: Box<dyn NotificationSink>,
    settings: SandboxConfig,
}

impl Sandbox {
    /// Headless sandbox on the system clock, printing to stdout.
    pub fn new(config: &Config) -> Self {
        Self::with_runtime(config, HostRuntime::headless(config.runtime.clone()))
    }

    pub fn with_runtime(config: &Config, runtime: HostRuntime) -> Self {
        Self {
            runtime,
            random: RandomModule::new(config.random.seed),
            output: Vec::new(),
            imports: BTreeSet::new(),
            globals: HashMap::new(),
            console: Box::new(StdConsole),
            notifier: Box::new(LogNotifier),
            settings: config.sandbox.clone(),
        }
    }

    pub fn with_console(mut self, console: impl ConsoleSink + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    pub fn with_notifier(mut self, notifier: impl NotificationSink + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    // ---------- state ----------

    /// Lines printed by the current run, including a trailing error line
    /// when it failed.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn runtime(&self) -> &HostRuntime {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut HostRuntime {
        &mut self.runtime
    }

    /// True while a `game.start` callback loop is active.
    pub fn expects_frame_loop(&self) -> bool {
        self.runtime.has_frame_loop()
    }

    // ---------- runs ----------

    /// Runs one guest program to completion and returns its output text.
    ///
    /// Any previous frame loop is stopped and its pending input dropped
    /// before the new program starts.
    pub fn run(&mut self, source: &str) -> Result<String, Fault> {
        self.runtime.prepare_run();
        self.output.clear();
        self.imports.clear();
        self.globals.clear();
        self.console.clear();

        let translation = translate(source);
        debug!("translated program:\n{}", translation.native);
        self.imports = translation.imports;

        let result = CompiledUnit::from_native(&translation.native)
            .and_then(|unit| self.invoke(&unit));
        match result {
            Ok(()) => {
                info!("run finished with {} output line(s)", self.output.len());
                Ok(self.output.join("\n"))
            }
            Err(fault) => {
                self.report(&fault);
                Err(fault)
            }
        }
    }

    pub fn run_project(&mut self, store: &dyn ProjectStore, name: &str) -> Result<String, RunError> {
        let source = store.source(name)?;
        info!("running {name}");
        Ok(self.run(&source)?)
    }

    fn invoke(&mut self, unit: &CompiledUnit) -> Result<(), Fault> {
        let mut mirror = Mirror {
            log: &mut self.output,
            console: self.console.as_mut(),
        };
        let caps = CapabilityBindings {
            output: &mut mirror,
            random: &mut self.random,
            runtime: &mut self.runtime,
        };
        let globals = std::mem::take(&mut self.globals);
        let mut vm = VM::new(unit, globals, caps, self.settings.max_call_depth);
        let result = vm.execute();
        self.globals = vm.into_globals();
        result
    }

    // ---------- frame loop ----------

    /// Polls the frame scheduler once and runs the guest callback when a
    /// frame is due. Returns whether the callback ran.
    ///
    /// A fault inside the callback stops the runtime and is reported the
    /// same way a run fault is.
    pub fn tick(&mut self) -> Result<bool, Fault> {
        let was_looping = self.runtime.has_frame_loop();
        let ran = match self.runtime.poll_frame() {
            FrameDue::Idle => false,
            FrameDue::Skipped => {
                self.runtime.present_paused();
                false
            }
            FrameDue::Run {
                callback,
                delta_seconds,
            } => {
                if let Err(fault) = self.invoke_callback(callback, delta_seconds) {
                    self.runtime.stop();
                    self.report(&fault);
                    return Err(fault);
                }
                self.runtime.end_frame(false);
                true
            }
        };
        if was_looping && !self.runtime.has_frame_loop() {
            self.notifier.notify(NotificationKind::Info, "Game stopped");
        }
        Ok(ran)
    }

    /// Blocks until the next frame is due.
    pub fn wait_for_frame(&mut self) {
        self.runtime.wait_for_frame();
    }

    /// The host's stop control.
    pub fn stop(&mut self) {
        let was_looping = self.runtime.has_frame_loop();
        self.runtime.stop();
        if was_looping {
            self.notifier.notify(NotificationKind::Info, "Game stopped");
        }
    }

    fn invoke_callback(&mut self, callback: Value, delta_seconds: f64) -> Result<(), Fault> {
        let mut mirror = Mirror {
            log: &mut self.output,
            console: self.console.as_mut(),
        };
        let caps = CapabilityBindings {
            output: &mut mirror,
            random: &mut self.random,
            runtime: &mut self.runtime,
        };
        let globals = std::mem::take(&mut self.globals);
        let mut vm = VM::with_globals(globals, caps, self.settings.max_call_depth);
        let result = vm.call_value(callback, vec![Value::Number(delta_seconds)]);
        if let Err(fault) = &result {
            vm.dbg_dump_state(&format!("frame callback fault: {fault}"));
        }
        self.globals = vm.into_globals();
        result.map(|_| ())
    }

    fn report(&mut self, fault: &Fault) {
        warn!("guest program failed: {fault}");
        let line = format!("❌ Error: {fault}");
        self.output.push(line.clone());
        self.console.write(LineStyle::Error, &line);
        self.notifier
            .notify(NotificationKind::Error, &fault.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;

    fn sandbox() -> (Sandbox, BufferConsole) {
        let console = BufferConsole::new();
        let mut config = Config::default();
        config.random.seed = Some(1);
        let sandbox = Sandbox::new(&config).with_console(console.clone());
        (sandbox, console)
    }

    #[test]
    fn prints_are_mirrored_to_the_console() {
        let (mut sandbox, console) = sandbox();
        let out = sandbox.run("print('a')\nprint('b', 1)\n").expect("run");
        assert_eq!(out, "a\nb 1");
        assert_eq!(console.styled(LineStyle::Log), vec!["a", "b 1"]);
    }

    #[test]
    fn imports_are_recorded() {
        let (mut sandbox, _) = sandbox();
        sandbox.run("import random\nfrom math import floor\n").expect("run");
        let imports: Vec<&str> = sandbox.imports().iter().map(String::as_str).collect();
        assert_eq!(imports, vec!["math", "random"]);
    }

    #[test]
    fn console_is_cleared_between_runs() {
        let (mut sandbox, console) = sandbox();
        sandbox.run("print('first')").expect("run");
        sandbox.run("print('second')").expect("run");
        assert_eq!(console.styled(LineStyle::Log), vec!["second"]);
    }

    #[test]
    fn deep_recursion_is_a_range_error() {
        let (mut sandbox, _) = sandbox();
        let fault = sandbox
            .run("def f(n):\n    return f(n + 1)\nf(0)\n")
            .unwrap_err();
        assert!(fault.to_string().contains("Maximum call stack size exceeded"));
    }
}
