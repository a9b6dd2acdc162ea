//! Keyboard and pointer state shared between input producers and guest code.
//!
//! Producers (window listeners, scripted input) push transitions through an
//! [`InputHandle`]. Each transition updates the live key map and pointer
//! synchronously and appends one event to the queue. Guest code drains the
//! queue with `events()` and reads the key map through a non-draining
//! [`KeySnapshot`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { key: String, code: String },
    KeyUp { key: String, code: String },
    MouseDown { x: f64, y: f64, button: u8 },
    MouseUp { x: f64, y: f64, button: u8 },
}

impl InputEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::KeyDown { .. } => "keydown",
            InputEvent::KeyUp { .. } => "keyup",
            InputEvent::MouseDown { .. } => "mousedown",
            InputEvent::MouseUp { .. } => "mouseup",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
    pub pressed: bool,
}

/// Named direction and action keys derived from the live key map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeySnapshot {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub space: bool,
    pub enter: bool,
    pub shift: bool,
    pub ctrl: bool,
}

impl KeySnapshot {
    pub fn entries(&self) -> [(&'static str, bool); 8] {
        [
            ("up", self.up),
            ("down", self.down),
            ("left", self.left),
            ("right", self.right),
            ("space", self.space),
            ("enter", self.enter),
            ("shift", self.shift),
            ("ctrl", self.ctrl),
        ]
    }
}

#[derive(Debug, Default)]
pub struct InputState {
    keys: HashMap<String, bool>,
    pointer: Pointer,
    queue: VecDeque<InputEvent>,
}

impl InputState {
    fn pressed(&self, name: &str) -> bool {
        self.keys.get(name).copied().unwrap_or(false)
    }

    fn set_key(&mut self, key: &str, code: &str, down: bool) {
        self.keys.insert(key.to_lowercase(), down);
        self.keys.insert(code.to_lowercase(), down);
    }

    pub fn snapshot(&self) -> KeySnapshot {
        KeySnapshot {
            up: self.pressed("arrowup") || self.pressed("w"),
            down: self.pressed("arrowdown") || self.pressed("s"),
            left: self.pressed("arrowleft") || self.pressed("a"),
            right: self.pressed("arrowright") || self.pressed("d"),
            space: self.pressed(" ") || self.pressed("space"),
            enter: self.pressed("enter"),
            shift: self.pressed("shift"),
            ctrl: self.pressed("control"),
        }
    }
}

/// Cloneable producer/consumer handle onto the shared input state.
///
/// The handle is `Send`, so a windowing thread can feed input while guest
/// code runs.
#[derive(Debug, Clone, Default)]
pub struct InputHandle {
    state: Arc<Mutex<InputState>>,
}

impl InputHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        // a panicking producer must not wedge the runtime
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key_down(&self, key: &str, code: &str) {
        let mut state = self.lock();
        state.set_key(key, code, true);
        state.queue.push_back(InputEvent::KeyDown {
            key: key.to_lowercase(),
            code: code.to_string(),
        });
    }

    pub fn key_up(&self, key: &str, code: &str) {
        let mut state = self.lock();
        state.set_key(key, code, false);
        state.queue.push_back(InputEvent::KeyUp {
            key: key.to_lowercase(),
            code: code.to_string(),
        });
    }

    /// Moves the pointer. Produces no event.
    pub fn pointer_move(&self, x: f64, y: f64) {
        let mut state = self.lock();
        state.pointer.x = x;
        state.pointer.y = y;
    }

    pub fn pointer_down(&self, button: u8) {
        let mut state = self.lock();
        state.pointer.pressed = true;
        let Pointer { x, y, .. } = state.pointer;
        state.queue.push_back(InputEvent::MouseDown { x, y, button });
    }

    pub fn pointer_up(&self, button: u8) {
        let mut state = self.lock();
        state.pointer.pressed = false;
        let Pointer { x, y, .. } = state.pointer;
        state.queue.push_back(InputEvent::MouseUp { x, y, button });
    }

    /// Returns every queued event in arrival order and empties the queue.
    pub fn drain_events(&self) -> Vec<InputEvent> {
        self.lock().queue.drain(..).collect()
    }

    pub fn keys(&self) -> KeySnapshot {
        self.lock().snapshot()
    }

    pub fn pointer(&self) -> Pointer {
        self.lock().pointer
    }

    /// Every key and code seen so far with its current state, by name.
    pub fn raw_keys(&self) -> Vec<(String, bool)> {
        let mut keys: Vec<_> = self
            .lock()
            .keys
            .iter()
            .map(|(name, down)| (name.clone(), *down))
            .collect();
        keys.sort();
        keys
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Drops queued events and releases all keys.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.queue.clear();
        state.keys.clear();
        state.pointer.pressed = false;
    }

    /// Releases all keys; queued events are kept.
    pub fn release_keys(&self) {
        self.lock().keys.clear();
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputScriptError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Unknown input action '{action}' at line {line}")]
    UnknownAction { line: usize, action: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedAction {
    KeyDown { key: String, code: String },
    KeyUp { key: String, code: String },
    PointerMove { x: f64, y: f64 },
    PointerDown(u8),
    PointerUp(u8),
}

/// Input played back at fixed frame numbers, for headless runs.
///
/// One action per line: `@<frame> <action> [args]`, where action is
/// `keydown <key> [code]`, `keyup <key> [code]`, `mousemove <x> <y>`,
/// `mousedown [button]` or `mouseup [button]`. `#` starts a comment.
#[derive(Debug, Clone, Default)]
pub struct InputScript {
    actions: BTreeMap<u64, Vec<ScriptedAction>>,
}

impl InputScript {
    pub fn from_text(text: &str) -> Result<Self, InputScriptError> {
        let mut actions: BTreeMap<u64, Vec<ScriptedAction>> = BTreeMap::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let parse_error = |message: &str| InputScriptError::ParseError {
                line,
                message: message.to_string(),
            };

            let mut words = content.split_whitespace();
            let frame = words
                .next()
                .and_then(|w| w.strip_prefix('@'))
                .ok_or_else(|| parse_error("expected '@<frame>'"))?
                .parse::<u64>()
                .map_err(|_| parse_error("invalid frame number"))?;
            let action = words.next().ok_or_else(|| parse_error("missing action"))?;
            let args: Vec<&str> = words.collect();

            let number = |i: usize| -> Result<f64, InputScriptError> {
                args.get(i)
                    .ok_or_else(|| parse_error("missing coordinate"))?
                    .parse::<f64>()
                    .map_err(|_| parse_error("invalid coordinate"))
            };
            let button = || -> Result<u8, InputScriptError> {
                match args.first() {
                    Some(b) => b.parse::<u8>().map_err(|_| parse_error("invalid button")),
                    None => Ok(0),
                }
            };
            let key_args = || -> Result<(String, String), InputScriptError> {
                let key: &str = args.first().copied().ok_or_else(|| parse_error("missing key"))?;
                let key = if key == "space" { " " } else { key };
                let code = match args.get(1) {
                    Some(code) => code.to_string(),
                    None => default_code(key),
                };
                Ok((key.to_string(), code))
            };

            let scripted = match action {
                "keydown" => {
                    let (key, code) = key_args()?;
                    ScriptedAction::KeyDown { key, code }
                }
                "keyup" => {
                    let (key, code) = key_args()?;
                    ScriptedAction::KeyUp { key, code }
                }
                "mousemove" => ScriptedAction::PointerMove {
                    x: number(0)?,
                    y: number(1)?,
                },
                "mousedown" => ScriptedAction::PointerDown(button()?),
                "mouseup" => ScriptedAction::PointerUp(button()?),
                other => {
                    return Err(InputScriptError::UnknownAction {
                        line,
                        action: other.to_string(),
                    });
                }
            };
            actions.entry(frame).or_default().push(scripted);
        }

        Ok(Self { actions })
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Feeds every action scheduled for `frame` into `input`.
    pub fn apply(&self, frame: u64, input: &InputHandle) {
        let Some(actions) = self.actions.get(&frame) else {
            return;
        };
        for action in actions {
            match action {
                ScriptedAction::KeyDown { key, code } => input.key_down(key, code),
                ScriptedAction::KeyUp { key, code } => input.key_up(key, code),
                ScriptedAction::PointerMove { x, y } => input.pointer_move(*x, *y),
                ScriptedAction::PointerDown(button) => input.pointer_down(*button),
                ScriptedAction::PointerUp(button) => input.pointer_up(*button),
            }
        }
    }
}

/// Physical key code a browser would report for a key name.
fn default_code(key: &str) -> String {
    match key.to_lowercase().as_str() {
        " " => "Space".to_string(),
        "arrowup" => "ArrowUp".to_string(),
        "arrowdown" => "ArrowDown".to_string(),
        "arrowleft" => "ArrowLeft".to_string(),
        "arrowright" => "ArrowRight".to_string(),
        "enter" => "Enter".to_string(),
        "shift" => "ShiftLeft".to_string(),
        "control" => "ControlLeft".to_string(),
        k if k.len() == 1 && k.chars().all(|c| c.is_ascii_alphabetic()) => {
            format!("Key{}", k.to_uppercase())
        }
        k if k.len() == 1 && k.chars().all(|c| c.is_ascii_digit()) => format!("Digit{k}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_drain_and_keys_snapshot() {
        let input = InputHandle::new();
        input.key_down("ArrowLeft", "ArrowLeft");
        let first = input.drain_events();
        assert_eq!(first.len(), 1);
        assert!(input.drain_events().is_empty());
        assert_eq!(input.keys(), input.keys());
        assert!(input.keys().left);
    }

    #[test]
    fn events_arrive_in_order() {
        let input = InputHandle::new();
        input.key_down("a", "KeyA");
        input.pointer_move(4.0, 5.0);
        input.pointer_down(0);
        input.key_up("a", "KeyA");
        let kinds: Vec<_> = input.drain_events().iter().map(InputEvent::kind).collect();
        assert_eq!(kinds, vec!["keydown", "mousedown", "keyup"]);
        assert!(!input.keys().left);
        assert!(input.pointer().pressed);
    }

    #[test]
    fn code_also_sets_key_state() {
        let input = InputHandle::new();
        input.key_down(" ", "Space");
        assert!(input.keys().space);
        input.key_up(" ", "Space");
        assert!(!input.keys().space);
    }

    #[test]
    fn reset_discards_pending_events() {
        let input = InputHandle::new();
        input.key_down("w", "KeyW");
        input.reset();
        assert_eq!(input.pending(), 0);
        assert!(!input.keys().up);
    }

    #[test]
    fn handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<InputHandle>();
    }

    #[test]
    fn script_parses_and_applies_per_frame() {
        let script = InputScript::from_text(
            "# demo\n@2 keydown arrowright\n@2 mousemove 10 20\n@3 mousedown\n@5 keyup arrowright\n",
        )
        .expect("parse");
        let input = InputHandle::new();
        script.apply(1, &input);
        assert_eq!(input.pending(), 0);
        script.apply(2, &input);
        assert!(input.keys().right);
        assert_eq!(input.pointer().x, 10.0);
        script.apply(3, &input);
        assert_eq!(
            input.drain_events().last(),
            Some(&InputEvent::MouseDown {
                x: 10.0,
                y: 20.0,
                button: 0
            })
        );
    }

    #[test]
    fn script_rejects_unknown_actions() {
        let err = InputScript::from_text("@1 jump").unwrap_err();
        assert_eq!(
            err,
            InputScriptError::UnknownAction {
                line: 1,
                action: "jump".into()
            }
        );
    }

    #[test]
    fn script_requires_frame_marker() {
        let err = InputScript::from_text("keydown a").unwrap_err();
        assert!(matches!(err, InputScriptError::ParseError { line: 1, .. }));
    }
}
