use super::VM;
use super::runtime::{compare, describe, display, print_form, to_number};
use crate::error::Fault;
use crate::grammar::{Capability, ListRef, MapRef, Native, Value};
use crate::runtime::RuntimeError;
use crate::runtime::geometry::{Rect, check_collision};
use crate::runtime::input::{InputEvent, KeySnapshot, Pointer};
use crate::runtime::surface::{Color, DrawCommand};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::rc::Rc;

lazy_static! {
    static ref FLOAT_PREFIX: Regex =
        Regex::new(r"^[+-]?(Infinity|(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?)").unwrap();
}

const RUNTIME_METHODS: &[&str] = &[
    "init",
    "start",
    "stop",
    "update",
    "pause",
    "clear",
    "rect",
    "circle",
    "line",
    "text",
    "image",
    "get_keys",
    "events",
    "checkCollision",
    "random",
];

const RANDOM_METHODS: &[&str] = &["randint", "random", "choice", "shuffle"];

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn num(args: &[Value], i: usize) -> f64 {
    args.get(i).map(to_number).unwrap_or(f64::NAN)
}

/// Numeric argument that falls back to `default` when missing or null.
fn num_or(args: &[Value], i: usize, default: f64) -> f64 {
    match args.get(i) {
        None | Some(Value::Null) => default,
        Some(v) => to_number(v),
    }
}

fn color_arg(args: &[Value], i: usize, default: Color) -> Color {
    match args.get(i) {
        Some(Value::List(channels)) => {
            let channels = channels.borrow();
            if channels.len() < 3 {
                return default;
            }
            Color::from_channels(
                to_number(&channels[0]),
                to_number(&channels[1]),
                to_number(&channels[2]),
            )
        }
        Some(Value::Str(token)) => Color::Token(token.to_string()),
        _ => default,
    }
}

fn surface_fault(err: RuntimeError) -> Fault {
    Fault::error(err.to_string())
}

fn null_access(name: &str) -> Fault {
    Fault::type_error(format!("Cannot read properties of null (reading '{name}')"))
}

fn not_a_function(receiver: &Value, name: &str) -> Fault {
    Fault::type_error(format!("{}.{name} is not a function", describe(receiver)))
}

impl VM<'_> {
    // =========================================================
    // Host natives
    // =========================================================

    pub(crate) fn call_native(&mut self, native: Native, args: Vec<Value>) -> Result<Value, Fault> {
        match native {
            Native::Print => {
                let line = args
                    .iter()
                    .map(print_form)
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" ");
                self.caps.output.write_line(&line);
                Ok(Value::Null)
            }
            Native::StringOf => Ok(Value::str(args.first().map(display).unwrap_or_default())),
            Native::ParseInt => {
                let radix = match args.get(1) {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(to_number(v)),
                };
                Ok(Value::Number(parse_int(&display(&arg(&args, 0)), radix)))
            }
            Native::ParseFloat => Ok(Value::Number(parse_float(&display(&arg(&args, 0))))),
            Native::Bound(cap, name) => self.call_method(Value::Capability(cap), &name, args),
        }
    }

    // =========================================================
    // Method calls
    // =========================================================

    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        match &receiver {
            Value::Capability(Capability::Random) => self.random_method(name, &args),
            Value::Capability(Capability::Runtime) => self.runtime_method(name, &args),
            Value::List(items) => list_method(items, name, &args)
                .ok_or_else(|| not_a_function(&receiver, name))?,
            Value::Str(s) => {
                str_method(s, name, &args).ok_or_else(|| not_a_function(&receiver, name))?
            }
            Value::Map(entries) => {
                let member = entries.borrow().get(name).cloned();
                match member {
                    Some(callee) if callee.is_callable() => self.call_value(callee, args),
                    Some(_) => Err(not_a_function(&receiver, name)),
                    None => map_method(entries, name, &args)
                        .ok_or_else(|| not_a_function(&receiver, name))?,
                }
            }
            Value::Null => Err(null_access(name)),
            _ => Err(not_a_function(&receiver, name)),
        }
    }

    fn random_method(&mut self, name: &str, args: &[Value]) -> Result<Value, Fault> {
        let random = &mut *self.caps.random;
        match name {
            "randint" => Ok(Value::Number(random.randint(num(args, 0), num(args, 1)))),
            "random" => Ok(Value::Number(random.random())),
            "choice" => match args.first() {
                Some(Value::List(items)) => {
                    let items = items.borrow();
                    Ok(random
                        .index(items.len())
                        .map(|i| items[i].clone())
                        .unwrap_or(Value::Null))
                }
                Some(Value::Str(s)) => {
                    let chars: Vec<char> = s.chars().collect();
                    Ok(random
                        .index(chars.len())
                        .map(|i| Value::str(chars[i].to_string()))
                        .unwrap_or(Value::Null))
                }
                other => Err(Fault::type_error(format!(
                    "Cannot choose from {}",
                    describe(other.unwrap_or(&Value::Null))
                ))),
            },
            "shuffle" => match args.first() {
                Some(list @ Value::List(items)) => {
                    random.shuffle(items.borrow_mut().as_mut_slice());
                    Ok(list.clone())
                }
                other => Err(Fault::type_error(format!(
                    "Cannot shuffle {}",
                    describe(other.unwrap_or(&Value::Null))
                ))),
            },
            _ => Err(Fault::type_error(format!("random.{name} is not a function"))),
        }
    }

    fn runtime_method(&mut self, name: &str, args: &[Value]) -> Result<Value, Fault> {
        let rt = &mut *self.caps.runtime;
        let command = match name {
            "init" => {
                let (width, height) = {
                    let settings = rt.settings();
                    (settings.width as f64, settings.height as f64)
                };
                let title = match args.get(2) {
                    None | Some(Value::Null) => "Game".to_string(),
                    Some(v) => display(v),
                };
                let ok = rt
                    .init(num_or(args, 0, width), num_or(args, 1, height), &title)
                    .map_err(surface_fault)?;
                return Ok(Value::Bool(ok));
            }
            "start" => {
                let callback = arg(args, 0);
                if !callback.is_callable() {
                    return Err(Fault::type_error(format!(
                        "{} is not a function",
                        describe(&callback)
                    )));
                }
                let fps = match args.get(1) {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(to_number(v)),
                };
                rt.start(callback, fps);
                return Ok(Value::Null);
            }
            "stop" => {
                rt.stop();
                return Ok(Value::Null);
            }
            "update" => {
                let fps = args.first().map(to_number).filter(|f| !f.is_nan());
                rt.update(fps);
                return Ok(Value::Null);
            }
            "pause" => {
                rt.pause();
                return Ok(Value::Null);
            }
            "get_keys" => return Ok(keys_value(rt.get_keys())),
            "events" => {
                let events = rt.events().into_iter().map(event_value).collect();
                return Ok(Value::list(events));
            }
            "checkCollision" => {
                let a = rect_of(&arg(args, 0))?;
                let b = rect_of(&arg(args, 1))?;
                return Ok(Value::Bool(check_collision(&a, &b)));
            }
            "random" => {
                let n = self.caps.random.randint(num(args, 0), num(args, 1));
                return Ok(Value::Number(n));
            }

            "clear" => DrawCommand::Clear(color_arg(args, 0, Color::BLACK)),
            "rect" => DrawCommand::Rect {
                x: num(args, 0),
                y: num(args, 1),
                width: num(args, 2),
                height: num(args, 3),
                color: color_arg(args, 4, Color::WHITE),
            },
            "circle" => DrawCommand::Circle {
                x: num(args, 0),
                y: num(args, 1),
                radius: num(args, 2),
                color: color_arg(args, 3, Color::WHITE),
            },
            "line" => DrawCommand::Line {
                x1: num(args, 0),
                y1: num(args, 1),
                x2: num(args, 2),
                y2: num(args, 3),
                color: color_arg(args, 4, Color::WHITE),
                width: num_or(args, 5, 1.0),
            },
            "text" => DrawCommand::Text {
                text: display(&arg(args, 0)),
                x: num(args, 1),
                y: num(args, 2),
                color: color_arg(args, 3, Color::WHITE),
                size: num_or(args, 4, 16.0),
                center: arg(args, 5).is_truthy(),
            },
            "image" => {
                let width = arg(args, 3);
                let height = arg(args, 4);
                let size = (width.is_truthy() && height.is_truthy())
                    .then(|| (to_number(&width), to_number(&height)));
                DrawCommand::Image {
                    source: display(&arg(args, 0)),
                    x: num(args, 1),
                    y: num(args, 2),
                    size,
                }
            }
            _ => return Err(Fault::type_error(format!("game.{name} is not a function"))),
        };
        rt.draw(command).map_err(surface_fault)?;
        Ok(Value::Null)
    }

    // =========================================================
    // Fields
    // =========================================================

    pub(crate) fn field_get(&self, target: &Value, name: &str) -> Result<Value, Fault> {
        match target {
            Value::Map(entries) => Ok(entries.borrow().get(name).cloned().unwrap_or(Value::Null)),
            Value::List(items) if name == "length" => Ok(Value::Number(items.borrow().len() as f64)),
            Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Capability(Capability::Runtime) => {
                let rt = &*self.caps.runtime;
                let (width, height) = rt.size();
                Ok(match name {
                    "running" => Value::Bool(rt.is_running()),
                    "paused" => Value::Bool(rt.is_paused()),
                    "fps" => Value::Number(rt.fps()),
                    "target_fps" | "targetFPS" => Value::Number(rt.target_fps()),
                    "width" => Value::Number(width as f64),
                    "height" => Value::Number(height as f64),
                    "title" => Value::str(rt.title()),
                    "mouse" => pointer_value(rt.pointer()),
                    "keys" => Value::map(
                        rt.raw_keys()
                            .into_iter()
                            .map(|(name, down)| (name, Value::Bool(down)))
                            .collect(),
                    ),
                    _ if RUNTIME_METHODS.contains(&name) => {
                        Value::Native(Native::Bound(Capability::Runtime, Rc::from(name)))
                    }
                    _ => Value::Null,
                })
            }
            Value::Capability(Capability::Random) if RANDOM_METHODS.contains(&name) => Ok(
                Value::Native(Native::Bound(Capability::Random, Rc::from(name))),
            ),
            Value::Null => Err(null_access(name)),
            _ => Ok(Value::Null),
        }
    }

    pub(crate) fn field_set(&mut self, target: &Value, name: &str, value: Value) -> Result<(), Fault> {
        match target {
            Value::Map(entries) => {
                entries.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Value::Capability(Capability::Runtime) if name == "running" => {
                if !value.is_truthy() {
                    self.caps.runtime.stop();
                }
                Ok(())
            }
            Value::Capability(Capability::Runtime) if name == "paused" => {
                if value.is_truthy() != self.caps.runtime.is_paused() {
                    self.caps.runtime.pause();
                }
                Ok(())
            }
            Value::Null => Err(Fault::type_error(format!(
                "Cannot set properties of null (setting '{name}')"
            ))),
            other => Err(Fault::type_error(format!(
                "Cannot set property '{name}' of {}",
                other.type_name()
            ))),
        }
    }
}

// =========================================================
// Receiver methods
// =========================================================

/// `None` when the list has no method called `name`.
fn list_method(items: &ListRef, name: &str, args: &[Value]) -> Option<Result<Value, Fault>> {
    let result = match name {
        "append" | "push" => {
            items.borrow_mut().extend(args.iter().cloned());
            Ok(Value::Number(items.borrow().len() as f64))
        }
        "extend" => match args.first() {
            Some(Value::List(other)) => {
                let extra = other.borrow().clone();
                items.borrow_mut().extend(extra);
                Ok(Value::Null)
            }
            other => Err(Fault::type_error(format!(
                "{} is not iterable",
                describe(other.unwrap_or(&Value::Null))
            ))),
        },
        "pop" => {
            let index = match args.first() {
                None | Some(Value::Null) => None,
                Some(index) => Some(to_number(index)),
            };
            let mut items = items.borrow_mut();
            match index {
                None => Ok(items.pop().unwrap_or(Value::Null)),
                Some(i) => {
                    let len = items.len() as f64;
                    let i = if i < 0.0 { len + i } else { i };
                    if i >= 0.0 && i < len && i.fract() == 0.0 {
                        Ok(items.remove(i as usize))
                    } else {
                        Err(Fault::range("pop index out of range"))
                    }
                }
            }
        }
        "insert" => {
            let i = to_number(&arg(args, 0)).trunc();
            let mut items = items.borrow_mut();
            let len = items.len() as f64;
            let i = if i < 0.0 { (len + i).max(0.0) } else { i.min(len) };
            let i = if i.is_nan() { 0 } else { i as usize };
            items.insert(i, arg(args, 1));
            Ok(Value::Null)
        }
        "remove" => {
            let needle = arg(args, 0);
            let found = items.borrow().iter().position(|v| *v == needle);
            match found {
                Some(i) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::Null)
                }
                None => Err(Fault::error(format!(
                    "list.remove(x): {} not in list",
                    describe(&needle)
                ))),
            }
        }
        "index" | "indexOf" => {
            let needle = arg(args, 0);
            match items.borrow().iter().position(|v| *v == needle) {
                Some(i) => Ok(Value::Number(i as f64)),
                None if name == "indexOf" => Ok(Value::Number(-1.0)),
                None => Err(Fault::error(format!("{} is not in list", describe(&needle)))),
            }
        }
        "count" => {
            let needle = arg(args, 0);
            let n = items.borrow().iter().filter(|v| **v == needle).count();
            Ok(Value::Number(n as f64))
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(Value::Bool(items.borrow().iter().any(|v| *v == needle)))
        }
        "clear" => {
            items.borrow_mut().clear();
            Ok(Value::Null)
        }
        "copy" => Ok(Value::list(items.borrow().clone())),
        "reverse" => {
            items.borrow_mut().reverse();
            Ok(Value::List(Rc::clone(items)))
        }
        "sort" => {
            let mut sorted = items.borrow().clone();
            sorted.sort_by(sort_order);
            *items.borrow_mut() = sorted;
            Ok(Value::List(Rc::clone(items)))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Null) => ",".to_string(),
                Some(v) => display(v),
            };
            let parts: Vec<String> = items.borrow().iter().map(display).collect();
            Ok(Value::str(parts.join(&sep)))
        }
        _ => return None,
    };
    Some(result)
}

/// Numbers sort numerically; anything else by its string form.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) | (Value::Str(_), Value::Str(_)) => {
            compare(a, b).unwrap_or(Ordering::Equal)
        }
        _ => display(a).cmp(&display(b)),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Option<Result<Value, Fault>> {
    let text_arg = |i: usize| display(&arg(args, i));
    let value = match name {
        "upper" | "toUpperCase" => Value::str(s.to_uppercase()),
        "lower" | "toLowerCase" => Value::str(s.to_lowercase()),
        "strip" | "trim" => Value::str(s.trim()),
        "lstrip" => Value::str(s.trim_start()),
        "rstrip" => Value::str(s.trim_end()),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Null) => s.split_whitespace().map(Value::str).collect(),
                Some(sep) => {
                    let sep = display(sep);
                    if sep.is_empty() {
                        return Some(Err(Fault::error("empty separator")));
                    }
                    s.split(sep.as_str()).map(Value::str).collect()
                }
            };
            Value::list(parts)
        }
        "startswith" | "startsWith" => Value::Bool(s.starts_with(text_arg(0).as_str())),
        "endswith" | "endsWith" => Value::Bool(s.ends_with(text_arg(0).as_str())),
        "includes" => Value::Bool(s.contains(text_arg(0).as_str())),
        "replace" => Value::str(s.replace(text_arg(0).as_str(), &text_arg(1))),
        "find" | "indexOf" => {
            let position = s
                .find(text_arg(0).as_str())
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Value::Number(position)
        }
        "join" => match args.first() {
            Some(Value::List(items)) => {
                let parts: Vec<String> = items.borrow().iter().map(display).collect();
                Value::str(parts.join(s))
            }
            other => {
                return Some(Err(Fault::type_error(format!(
                    "can only join a list, not {}",
                    other.unwrap_or(&Value::Null).type_name()
                ))));
            }
        },
        _ => return None,
    };
    Some(Ok(value))
}

fn map_method(entries: &MapRef, name: &str, args: &[Value]) -> Option<Result<Value, Fault>> {
    let value = match name {
        "keys" => Value::list(entries.borrow().keys().map(Value::str).collect()),
        "values" => Value::list(entries.borrow().values().cloned().collect()),
        "items" => Value::list(
            entries
                .borrow()
                .iter()
                .map(|(k, v)| Value::list(vec![Value::str(k), v.clone()]))
                .collect(),
        ),
        "get" => entries
            .borrow()
            .get(&display(&arg(args, 0)))
            .cloned()
            .unwrap_or_else(|| arg(args, 1)),
        "pop" => {
            let key = display(&arg(args, 0));
            let removed = entries.borrow_mut().shift_remove(&key);
            removed.unwrap_or_else(|| arg(args, 1))
        }
        "update" => {
            if let Some(Value::Map(other)) = args.first() {
                let extra: Vec<(String, Value)> = other
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                entries.borrow_mut().extend(extra);
            }
            Value::Null
        }
        "copy" => Value::map(entries.borrow().clone()),
        _ => return None,
    };
    Some(Ok(value))
}

// =========================================================
// Runtime value conversions
// =========================================================

fn keys_value(keys: KeySnapshot) -> Value {
    let entries: IndexMap<String, Value> = keys
        .entries()
        .iter()
        .map(|(name, down)| (name.to_string(), Value::Bool(*down)))
        .collect();
    Value::map(entries)
}

fn pointer_value(pointer: Pointer) -> Value {
    let mut entries = IndexMap::new();
    entries.insert("x".to_string(), Value::Number(pointer.x));
    entries.insert("y".to_string(), Value::Number(pointer.y));
    entries.insert("pressed".to_string(), Value::Bool(pointer.pressed));
    Value::map(entries)
}

fn event_value(event: InputEvent) -> Value {
    let mut entries = IndexMap::new();
    entries.insert("type".to_string(), Value::str(event.kind()));
    match event {
        InputEvent::KeyDown { key, code } | InputEvent::KeyUp { key, code } => {
            entries.insert("key".to_string(), Value::str(key));
            entries.insert("code".to_string(), Value::str(code));
        }
        InputEvent::MouseDown { x, y, button } | InputEvent::MouseUp { x, y, button } => {
            entries.insert("x".to_string(), Value::Number(x));
            entries.insert("y".to_string(), Value::Number(y));
            entries.insert("button".to_string(), Value::Number(button as f64));
        }
    }
    Value::map(entries)
}

/// Reads `x`, `y`, `width` and `height` off a map.
fn rect_of(v: &Value) -> Result<Rect, Fault> {
    match v {
        Value::Map(entries) => {
            let entries = entries.borrow();
            let field = |k: &str| entries.get(k).map(to_number).unwrap_or(f64::NAN);
            Ok(Rect::new(field("x"), field("y"), field("width"), field("height")))
        }
        Value::Null => Err(null_access("x")),
        _ => Ok(Rect::new(f64::NAN, f64::NAN, f64::NAN, f64::NAN)),
    }
}

// =========================================================
// Number parsing
// =========================================================

/// Leading-integer parse: skips whitespace, takes an optional sign and as
/// many digits as the radix allows. NaN when no digit is found.
fn parse_int(text: &str, radix: Option<f64>) -> f64 {
    let mut rest = text.trim_start();
    let mut sign = 1.0;
    if let Some(stripped) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }

    let explicit = radix.filter(|r| r.is_finite() && *r != 0.0).map(|r| r.trunc());
    let mut radix = match explicit {
        Some(r) if (2.0..=36.0).contains(&r) => r as u32,
        Some(_) => return f64::NAN,
        None => 10,
    };
    if explicit.is_none() || radix == 16 {
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            rest = hex;
            radix = 16;
        }
    }

    let mut value = 0.0;
    let mut seen = false;
    for c in rest.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                seen = true;
            }
            None => break,
        }
    }
    if seen { sign * value } else { f64::NAN }
}

fn parse_float(text: &str) -> f64 {
    FLOAT_PREFIX
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int_takes_the_leading_integer() {
        assert_eq!(parse_int("  42px", None), 42.0);
        assert_eq!(parse_int("-7", None), -7.0);
        assert_eq!(parse_int("3.9", None), 3.0);
        assert_eq!(parse_int("ff", Some(16.0)), 255.0);
        assert_eq!(parse_int("0x1A", None), 26.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn parse_float_takes_the_leading_number() {
        assert_eq!(parse_float("3.25 apples"), 3.25);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn list_methods_mutate_in_place() {
        let list = Value::list(vec![Value::Number(3.0), Value::Number(1.0)]);
        let Value::List(items) = &list else {
            unreachable!()
        };
        list_method(items, "append", &[Value::Number(2.0)]);
        list_method(items, "sort", &[]);
        assert_eq!(
            list,
            Value::list(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)])
        );
        let popped = list_method(items, "pop", &[Value::Number(0.0)]);
        assert_eq!(popped, Some(Ok(Value::Number(1.0))));
    }

    #[test]
    fn removing_a_missing_item_is_an_error() {
        let Value::List(items) = Value::list(vec![]) else {
            unreachable!()
        };
        let result = list_method(&items, "remove", &[Value::Number(1.0)]);
        assert!(matches!(result, Some(Err(_))));
    }

    #[test]
    fn unknown_methods_are_not_found() {
        assert!(str_method("abc", "frobnicate", &[]).is_none());
    }

    #[test]
    fn string_methods_follow_guest_semantics() {
        assert_eq!(
            str_method("a-b-a", "replace", &[Value::str("a"), Value::str("x")]),
            Some(Ok(Value::str("x-b-x")))
        );
        assert_eq!(
            str_method(" a  b ", "split", &[]),
            Some(Ok(Value::list(vec![Value::str("a"), Value::str("b")])))
        );
        assert_eq!(
            str_method(", ", "join", &[Value::list(vec![Value::str("a"), Value::Number(1.0)])]),
            Some(Ok(Value::str("a, 1")))
        );
    }

    #[test]
    fn collision_reads_map_fields() {
        let mut a = IndexMap::new();
        for (k, v) in [("x", 0.0), ("y", 0.0), ("width", 10.0), ("height", 10.0)] {
            a.insert(k.to_string(), Value::Number(v));
        }
        let rect = rect_of(&Value::map(a)).expect("rect");
        assert_eq!(rect, Rect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn keydown_events_become_maps_with_a_type() {
        let event = event_value(InputEvent::KeyDown {
            key: "arrowup".into(),
            code: "ArrowUp".into(),
        });
        let Value::Map(entries) = event else {
            unreachable!()
        };
        assert_eq!(entries.borrow().get("type"), Some(&Value::str("keydown")));
        assert_eq!(entries.borrow().get("key"), Some(&Value::str("arrowup")));
    }
}
