use super::VM;
use crate::error::Fault;
use crate::grammar::{Instruction, IterState, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

impl VM<'_> {
    // =========================================================
    // Stack helpers
    // =========================================================

    pub(crate) fn pop(&mut self) -> Result<Value, Fault> {
        self.stack
            .pop()
            .ok_or_else(|| Fault::error("internal error: stack underflow"))
    }

    pub(crate) fn peek(&self) -> Result<&Value, Fault> {
        self.stack
            .last()
            .ok_or_else(|| Fault::error("internal error: stack underflow"))
    }

    pub(crate) fn pop_args(&mut self, argc: usize) -> Result<Vec<Value>, Fault> {
        if self.stack.len() < argc {
            return Err(Fault::error("internal error: stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - argc))
    }
}

// =========================================================
// Conversions
// =========================================================

/// Number formatting as the host language prints it: integral values have
/// no fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// String coercion (`String(x)`, template interpolation, concatenation).
pub fn display(v: &Value) -> String {
    display_guarded(v, &mut Vec::new())
}

/// `seen` holds the lists currently being rendered; meeting one again
/// renders it as empty.
fn display_guarded(v: &Value, seen: &mut Vec<*const ()>) -> String {
    match v {
        Value::Number(n) => format_number(*n),
        Value::Str(s) => s.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items) as *const ();
            if seen.contains(&ptr) {
                return String::new();
            }
            seen.push(ptr);
            let text = items
                .borrow()
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => display_guarded(other, seen),
                })
                .collect::<Vec<_>>()
                .join(",");
            seen.pop();
            text
        }
        Value::Map(_) | Value::Capability(_) => "[object Object]".to_string(),
        Value::Function(proto) => format!("function {}() {{ [code] }}", proto.name),
        Value::Native(_) => "function () { [native code] }".to_string(),
        Value::Iterator(_) => "[object Iterator]".to_string(),
    }
}

/// Short rendering for fault messages.
pub fn describe(v: &Value) -> String {
    match v {
        Value::Str(s) => format!("\"{s}\""),
        Value::List(_) | Value::Map(_) => print_form(v).unwrap_or_else(|_| display(v)),
        other => display(other),
    }
}

/// Numeric coercion. Never fails; unconvertible values become NaN.
pub fn to_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => 0.0,
        Value::Str(s) => parse_numeric_string(s),
        Value::List(items) => {
            let items = items.borrow();
            match items.len() {
                0 => 0.0,
                1 => parse_numeric_string(&display(&items[0])),
                _ => f64::NAN,
            }
        }
        _ => f64::NAN,
    }
}

fn parse_numeric_string(s: &str) -> f64 {
    let t = s.trim();
    match t {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if t.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c)) => {
            t.parse().unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// JSON text used by `print` for lists and maps. A container that holds
/// itself is a `TypeError`.
pub fn to_json(v: &Value) -> Result<serde_json::Value, Fault> {
    json_guarded(v, &mut Vec::new())
}

fn json_guarded(v: &Value, seen: &mut Vec<*const ()>) -> Result<serde_json::Value, Fault> {
    use serde_json::Value as Json;
    Ok(match v {
        Value::Number(n) if !n.is_finite() => Json::Null,
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Json::from(*n as i64),
        Value::Number(n) => Json::from(*n),
        Value::Str(s) => Json::String(s.to_string()),
        Value::Bool(b) => Json::Bool(*b),
        Value::List(items) => {
            enter(seen, Rc::as_ptr(items) as *const ())?;
            let out = items
                .borrow()
                .iter()
                .map(|item| json_guarded(item, seen))
                .collect::<Result<Vec<_>, _>>()?;
            seen.pop();
            Json::Array(out)
        }
        Value::Map(entries) => {
            enter(seen, Rc::as_ptr(entries) as *const ())?;
            let mut out = serde_json::Map::new();
            for (k, v) in entries.borrow().iter().filter(|(_, v)| !v.is_callable()) {
                out.insert(k.clone(), json_guarded(v, seen)?);
            }
            seen.pop();
            Json::Object(out)
        }
        _ => Json::Null,
    })
}

fn enter(seen: &mut Vec<*const ()>, ptr: *const ()) -> Result<(), Fault> {
    if seen.contains(&ptr) {
        return Err(Fault::type_error("Converting circular structure to JSON"));
    }
    seen.push(ptr);
    Ok(())
}

/// How `print` renders one argument.
pub fn print_form(v: &Value) -> Result<String, Fault> {
    match v {
        Value::List(_) | Value::Map(_) => Ok(to_json(v)?.to_string()),
        other => Ok(display(other)),
    }
}

// =========================================================
// Operators
// =========================================================

pub fn arithmetic(op: &Instruction, a: Value, b: Value) -> Result<Value, Fault> {
    match op {
        Instruction::Add => Ok(add(a, b)),
        Instruction::Mul => Ok(multiply(a, b)),
        Instruction::Sub => Ok(Value::Number(to_number(&a) - to_number(&b))),
        Instruction::Div => Ok(Value::Number(to_number(&a) / to_number(&b))),
        Instruction::FloorDiv => Ok(Value::Number((to_number(&a) / to_number(&b)).floor())),
        Instruction::Modulo => Ok(Value::Number(to_number(&a) % to_number(&b))),
        Instruction::Pow => Ok(Value::Number(power(to_number(&a), to_number(&b)))),
        other => Err(Fault::error(format!(
            "internal error: {other:?} is not arithmetic"
        ))),
    }
}

/// `**` with the host's edge cases: `1 ** Infinity` is NaN.
fn power(base: f64, exponent: f64) -> f64 {
    if exponent.is_infinite() && base.abs() == 1.0 {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}

fn add(a: Value, b: Value) -> Value {
    match (&a, &b) {
        (Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Value::list(items)
        }
        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
        (Value::Str(_), _)
        | (_, Value::Str(_))
        | (Value::List(_) | Value::Map(_), _)
        | (_, Value::List(_) | Value::Map(_)) => Value::str(display(&a) + &display(&b)),
        _ => Value::Number(to_number(&a) + to_number(&b)),
    }
}

/// Numeric product; a list or string times a count repeats it.
fn multiply(a: Value, b: Value) -> Value {
    let repeat = |count: &Value| -> usize {
        let n = to_number(count);
        if n.is_finite() && n > 0.0 { n as usize } else { 0 }
    };
    match (&a, &b) {
        (Value::List(items), Value::Number(_)) | (Value::Number(_), Value::List(items)) => {
            let count = repeat(if matches!(a, Value::Number(_)) { &a } else { &b });
            let items = items.borrow();
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Value::list(out)
        }
        (Value::Str(s), Value::Number(_)) => Value::str(s.repeat(repeat(&b))),
        _ => Value::Number(to_number(&a) * to_number(&b)),
    }
}

/// Ordering for `<`-style comparisons. `None` when either side is NaN.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

/// The `in` operator.
pub fn contains(haystack: &Value, needle: &Value) -> Result<bool, Fault> {
    match haystack {
        Value::List(items) => Ok(items.borrow().iter().any(|item| item == needle)),
        Value::Map(entries) => Ok(entries.borrow().contains_key(&display(needle))),
        Value::Str(s) => Ok(s.contains(display(needle).as_str())),
        other => Err(Fault::type_error(format!(
            "Cannot use 'in' operator to search for {} in {}",
            describe(needle),
            describe(other)
        ))),
    }
}

// =========================================================
// Indexing
// =========================================================

/// Resolves a possibly negative integer index against `len`.
fn resolve_index(key: &Value, len: usize) -> Option<usize> {
    let n = match key {
        Value::Number(n) => *n,
        Value::Str(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.fract() != 0.0 {
        return None;
    }
    let i = if n < 0.0 { len as f64 + n } else { n };
    (i >= 0.0 && i < len as f64).then_some(i as usize)
}

pub fn index_value(target: &Value, key: &Value) -> Result<Value, Fault> {
    match target {
        Value::List(items) => {
            let items = items.borrow();
            Ok(resolve_index(key, items.len())
                .map(|i| items[i].clone())
                .unwrap_or(Value::Null))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(resolve_index(key, chars.len())
                .map(|i| Value::str(chars[i].to_string()))
                .unwrap_or(Value::Null))
        }
        Value::Map(entries) => Ok(entries
            .borrow()
            .get(&display(key))
            .cloned()
            .unwrap_or(Value::Null)),
        Value::Null => Err(Fault::type_error(format!(
            "Cannot read properties of null (reading '{}')",
            display(key)
        ))),
        _ => Ok(Value::Null),
    }
}

pub fn store_index(target: &Value, key: &Value, value: Value) -> Result<(), Fault> {
    match target {
        Value::List(items) => {
            let len = items.borrow().len();
            match resolve_index(key, len) {
                Some(i) => {
                    items.borrow_mut()[i] = value;
                    Ok(())
                }
                None => Err(Fault::range(format!(
                    "list assignment index {} out of range (length {len})",
                    display(key)
                ))),
            }
        }
        Value::Map(entries) => {
            let key = display(key);
            entries.borrow_mut().insert(key, value);
            Ok(())
        }
        Value::Null => Err(Fault::type_error(format!(
            "Cannot set properties of null (setting '{}')",
            display(key)
        ))),
        other => Err(Fault::type_error(format!(
            "Cannot assign to index '{}' of {}",
            display(key),
            other.type_name()
        ))),
    }
}

/// Clamped `[start:end]` bounds with negative offsets from the end.
fn slice_bounds(start: &Value, end: &Value, len: usize) -> (usize, usize) {
    let clamp = |v: &Value, default: usize| -> usize {
        match v {
            Value::Null => default,
            other => {
                let n = to_number(other);
                if n.is_nan() {
                    return 0;
                }
                let n = n.trunc();
                let i = if n < 0.0 { len as f64 + n } else { n };
                i.clamp(0.0, len as f64) as usize
            }
        }
    };
    let s = clamp(start, 0);
    let e = clamp(end, len);
    (s, e.max(s))
}

pub fn slice_value(target: &Value, start: &Value, end: &Value) -> Result<Value, Fault> {
    match target {
        Value::List(items) => {
            let items = items.borrow();
            let (s, e) = slice_bounds(start, end, items.len());
            Ok(Value::list(items[s..e].to_vec()))
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = slice_bounds(start, end, chars.len());
            Ok(Value::str(chars[s..e].iter().collect::<String>()))
        }
        other => Err(Fault::type_error(format!(
            "{} is not sliceable",
            other.type_name()
        ))),
    }
}

// =========================================================
// Iteration
// =========================================================

/// Lists iterate live (appends during the loop are visited); maps iterate
/// over a snapshot of their keys and strings over their characters.
pub fn build_iterator(iterable: Value) -> Result<Value, Fault> {
    let state = match iterable {
        Value::List(list) => IterState::Live { list, pos: 0 },
        Value::Map(entries) => IterState::Snapshot {
            items: entries.borrow().keys().map(Value::str).collect(),
            pos: 0,
        },
        Value::Str(s) => IterState::Snapshot {
            items: s.chars().map(|c| Value::str(c.to_string())).collect(),
            pos: 0,
        },
        other => {
            return Err(Fault::type_error(format!(
                "{} is not iterable",
                describe(&other)
            )));
        }
    };
    Ok(Value::Iterator(Rc::new(RefCell::new(state))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn plus_concatenates_when_a_string_is_involved() {
        let v = add(Value::str("Score: "), Value::Number(30.0));
        assert_eq!(v, Value::str("Score: 30"));
        assert_eq!(add(Value::Number(1.0), Value::Bool(true)), Value::Number(2.0));
    }

    #[test]
    fn lists_concatenate_and_repeat() {
        let a = Value::list(vec![Value::Number(1.0)]);
        let b = Value::list(vec![Value::Number(2.0)]);
        assert_eq!(
            add(a.clone(), b),
            Value::list(vec![Value::Number(1.0), Value::Number(2.0)])
        );
        assert_eq!(
            multiply(a, Value::Number(3.0)),
            Value::list(vec![Value::Number(1.0); 3])
        );
    }

    #[test]
    fn numeric_ops_on_garbage_give_nan() {
        let v = arithmetic(&Instruction::Sub, Value::str("abc"), Value::Number(1.0)).expect("sub");
        assert!(matches!(v, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn floor_division_rounds_down() {
        let v = arithmetic(&Instruction::FloorDiv, Value::Number(-7.0), Value::Number(2.0))
            .expect("div");
        assert_eq!(v, Value::Number(-4.0));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(index_value(&list, &Value::Number(-1.0)), Ok(Value::Number(2.0)));
        assert_eq!(index_value(&list, &Value::Number(5.0)), Ok(Value::Null));
    }

    #[test]
    fn storing_past_the_end_is_a_range_error() {
        let list = Value::list(vec![]);
        let err = store_index(&list, &Value::Number(0.0), Value::Null).unwrap_err();
        assert!(err.to_string().starts_with("RangeError"));
    }

    #[test]
    fn indexing_null_is_a_type_error() {
        let err = index_value(&Value::Null, &Value::str("x")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Cannot read properties of null (reading 'x')"
        );
    }

    #[test]
    fn tuples_compare_structurally_for_in() {
        let body = Value::list(vec![Value::list(vec![Value::Number(1.0), Value::Number(2.0)])]);
        let head = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(contains(&body, &head), Ok(true));
    }

    #[test]
    fn slices_clamp_and_copy() {
        let list = Value::list((0..5).map(|n| Value::Number(n as f64)).collect());
        let copy = slice_value(&list, &Value::Null, &Value::Null).expect("slice");
        assert_eq!(copy, list);
        let tail = slice_value(&list, &Value::Number(-2.0), &Value::Number(99.0)).expect("slice");
        assert_eq!(tail, Value::list(vec![Value::Number(3.0), Value::Number(4.0)]));
    }

    #[test]
    fn print_uses_json_for_containers() {
        let mut entries = IndexMap::new();
        entries.insert("x".to_string(), Value::Number(1.0));
        entries.insert("tags".to_string(), Value::list(vec![Value::str("a")]));
        assert_eq!(
            print_form(&Value::map(entries)).expect("json"),
            r#"{"x":1,"tags":["a"]}"#
        );
    }

    fn self_containing() -> Value {
        let list = Value::list(vec![Value::Number(1.0)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        list
    }

    #[test]
    fn cyclic_list_renders_the_cycle_as_empty() {
        assert_eq!(display(&self_containing()), "1,");
    }

    #[test]
    fn cyclic_list_is_not_json() {
        let fault = print_form(&self_containing()).unwrap_err();
        assert_eq!(
            fault.to_string(),
            "TypeError: Converting circular structure to JSON"
        );
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let child = Value::list(vec![Value::Number(1.0)]);
        let parent = Value::list(vec![child.clone(), child]);
        assert_eq!(print_form(&parent).expect("json"), "[[1],[1]]");
    }

    #[test]
    fn storing_into_a_list_keyed_by_itself_is_a_range_error() {
        let list = Value::list(vec![Value::Number(1.0)]);
        let fault = store_index(&list, &list, Value::Null).unwrap_err();
        assert!(fault.to_string().starts_with("RangeError"));
    }

    #[test]
    fn string_coercion_of_numbers() {
        assert_eq!(to_number(&Value::str(" 42 ")), 42.0);
        assert_eq!(to_number(&Value::str("")), 0.0);
        assert!(to_number(&Value::str("4x")).is_nan());
    }
}
