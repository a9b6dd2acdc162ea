//! Guest source to host-native program text.
//!
//! Translation is line oriented. Each logical guest line is classified by the
//! first matching construct in a fixed priority order and emitted on the same
//! line of the native text, so a fault in the native program reports the
//! guest line number. Block structure is inferred from indentation.

mod expression;

pub use expression::convert_expression;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    static ref IMPORT: Regex = Regex::new(r"^import\s+(.+)$").unwrap();
    static ref FROM_IMPORT: Regex = Regex::new(r"^from\s+([\w.]+)\s+import\b").unwrap();
    static ref SCOPE_DECL: Regex = Regex::new(r"^(global|nonlocal)\s+\w").unwrap();
    static ref PRINT: Regex = Regex::new(r"^print\s*\((.*)\)$").unwrap();
    static ref FOR: Regex = Regex::new(r"^for\s+(\w+)\s+in\s+(.+):$").unwrap();
    static ref RANGE: Regex = Regex::new(r"^range\s*\((.*)\)$").unwrap();
    static ref WHILE: Regex = Regex::new(r"^while\s+(.+):$").unwrap();
    static ref IF: Regex = Regex::new(r"^if\s+(.+):$").unwrap();
    static ref ELIF: Regex = Regex::new(r"^elif\s+(.+):$").unwrap();
    static ref ELSE: Regex = Regex::new(r"^else\s*:$").unwrap();
    static ref DEF: Regex = Regex::new(r"^def\s+(\w+)\s*\(([^)]*)\)\s*:$").unwrap();
    static ref RETURN: Regex = Regex::new(r"^return(?:\s+(.+))?$").unwrap();
    static ref AUGMENTED: Regex = Regex::new(r"^[\w\[\]'.\x22 ]+?\s*[-+*/]=\s*.+$").unwrap();
    static ref IDENT: Regex = Regex::new(r"^[A-Za-z_]\w*$").unwrap();
    static ref NEGATIVE_LITERAL: Regex = Regex::new(r"^-\s*\d+(\.\d+)?$").unwrap();
}

/// Result of one translation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Host-native program text, one line per guest line.
    pub native: String,
    /// Module names named by `import` / `from ... import`.
    pub imports: BTreeSet<String>,
}

/// Mutable state scoped to a single translation pass.
#[derive(Default)]
struct TranslationState {
    /// Indentation of each header whose block is still open.
    open_blocks: Vec<usize>,
    declared: HashSet<String>,
    loop_vars: HashSet<String>,
    imports: BTreeSet<String>,
    lines: Vec<String>,
}

/// One logical guest line: physical lines joined while brackets are open.
struct LogicalLine {
    indent: usize,
    text: String,
    swallowed: usize,
}

enum Emit {
    Blank,
    /// Emitted without touching the block stack.
    Passive(String),
    Statement(String),
}

pub fn translate(source: &str) -> Translation {
    let mut state = TranslationState::default();

    for line in logical_lines(source) {
        state.emit_line(&line);
        for _ in 0..line.swallowed {
            state.lines.push(String::new());
        }
    }

    state.finish()
}

impl TranslationState {
    fn emit_line(&mut self, line: &LogicalLine) {
        match self.classify(&line.text) {
            Emit::Blank => self.lines.push(String::new()),
            Emit::Passive(text) => {
                self.lines.push(format!("{}{}", " ".repeat(line.indent), text));
            }
            Emit::Statement(text) => {
                let continues = text.starts_with("} else");
                let closers = self.close_blocks(line.indent, continues);
                if text.ends_with('{') {
                    self.open_blocks.push(line.indent);
                }
                self.lines.push(format!(
                    "{}{}{}",
                    " ".repeat(line.indent),
                    "} ".repeat(closers),
                    text
                ));
            }
        }
    }

    /// Pops every block the line at `indent` ends and returns how many
    /// closers must be written. An `elif`/`else` header closes its sibling
    /// branch itself.
    fn close_blocks(&mut self, indent: usize, continues: bool) -> usize {
        let mut closers = 0;
        while let Some(&top) = self.open_blocks.last() {
            if top > indent {
                self.open_blocks.pop();
                closers += 1;
            } else if top == indent {
                self.open_blocks.pop();
                if !continues {
                    closers += 1;
                }
                break;
            } else {
                break;
            }
        }
        closers
    }

    fn classify(&mut self, text: &str) -> Emit {
        if text.is_empty() {
            return Emit::Blank;
        }
        if let Some(comment) = text.strip_prefix('#') {
            return Emit::Passive(format!("//{comment}"));
        }
        if let Some(caps) = IMPORT.captures(text) {
            let names: Vec<String> = caps[1]
                .split(',')
                .filter_map(|part| part.split_whitespace().next())
                .map(str::to_string)
                .collect();
            self.imports.extend(names.iter().cloned());
            return Emit::Passive(format!("// import {}", names.join(", ")));
        }
        if let Some(caps) = FROM_IMPORT.captures(text) {
            self.imports.insert(caps[1].to_string());
            return Emit::Passive(format!("// {text}"));
        }
        if SCOPE_DECL.is_match(text) {
            return Emit::Statement(";".to_string());
        }
        if let Some(caps) = PRINT.captures(text) {
            return Emit::Statement(format!("print({});", convert_expression(&caps[1])));
        }
        if let Some(caps) = FOR.captures(text) {
            let var = caps[1].to_string();
            let header = for_header(&var, caps[2].trim());
            self.loop_vars.insert(var);
            return Emit::Statement(header);
        }
        if let Some(caps) = WHILE.captures(text) {
            return Emit::Statement(format!("while ({}) {{", convert_expression(&caps[1])));
        }
        if let Some(caps) = IF.captures(text) {
            return Emit::Statement(format!("if ({}) {{", convert_expression(&caps[1])));
        }
        if let Some(caps) = ELIF.captures(text) {
            return Emit::Statement(format!("}} else if ({}) {{", convert_expression(&caps[1])));
        }
        if ELSE.is_match(text) {
            return Emit::Statement("} else {".to_string());
        }
        if let Some(caps) = DEF.captures(text) {
            return Emit::Statement(format!("function {}({}) {{", &caps[1], caps[2].trim()));
        }
        if let Some(caps) = RETURN.captures(text) {
            return Emit::Statement(match caps.get(1) {
                Some(value) => format!("return {};", convert_expression(value.as_str())),
                None => "return;".to_string(),
            });
        }
        match text {
            "break" => return Emit::Statement("break;".to_string()),
            "continue" => return Emit::Statement("continue;".to_string()),
            "pass" => return Emit::Statement(";".to_string()),
            _ => {}
        }
        if let Some(pos) = find_assignment(text) {
            let target = text[..pos].trim();
            let value = convert_expression(&text[pos + 1..]);
            let first_binding = IDENT.is_match(target)
                && !self.declared.contains(target)
                && !self.loop_vars.contains(target);
            if first_binding {
                self.declared.insert(target.to_string());
                return Emit::Statement(format!("let {target} = {value};"));
            }
            return Emit::Statement(format!("{target} = {value};"));
        }
        if AUGMENTED.is_match(text) {
            return Emit::Statement(format!("{text};"));
        }
        if text.contains('(') && text.contains(')') {
            return Emit::Statement(format!("{};", convert_expression(text)));
        }
        Emit::Statement(format!("{text};"))
    }

    fn finish(mut self) -> Translation {
        let remaining = self.open_blocks.len();
        self.open_blocks.clear();
        if remaining > 0 {
            self.lines.push("} ".repeat(remaining).trim_end().to_string());
        }

        let mut native = self.lines.join("\n");
        let missing = brace_balance(&native);
        if missing > 0 {
            debug!("repairing {missing} unbalanced block(s) in translated program");
            native.push('\n');
            native.push_str("} ".repeat(missing as usize).trim_end());
        }
        native.push('\n');

        Translation {
            native,
            imports: self.imports,
        }
    }
}

fn for_header(var: &str, iterable: &str) -> String {
    if let Some(caps) = RANGE.captures(iterable) {
        let args = split_top_level(&caps[1]);
        let (start, end, step) = match args.as_slice() {
            [end] => ("0".to_string(), convert_expression(end), None),
            [start, end] => (convert_expression(start), convert_expression(end), None),
            [start, end, step] => (
                convert_expression(start),
                convert_expression(end),
                Some(step.trim().to_string()),
            ),
            _ => return format!("for (let {var} of {}) {{", convert_expression(iterable)),
        };
        return match step {
            None => format!("for (let {var} = {start}; {var} < {end}; {var}++) {{"),
            Some(step) => {
                let test = if NEGATIVE_LITERAL.is_match(&step) { '>' } else { '<' };
                let step = convert_expression(&step);
                format!("for (let {var} = {start}; {var} {test} {end}; {var} += {step}) {{")
            }
        };
    }
    format!("for (let {var} of {}) {{", convert_expression(iterable))
}

/// Byte offset of the first top-level `=` that is not part of a comparison
/// or an augmented assignment.
fn find_assignment(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                let prev = if i > 0 { bytes[i - 1] } else { b' ' };
                let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                if next == b'=' {
                    i += 2;
                    continue;
                }
                if !matches!(prev, b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%') {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Splits on commas outside brackets and string literals.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts.into_iter().map(|p| p.trim().to_string()).collect()
}

/// Tracks string state across a guest line and reports where a trailing
/// `#` comment starts along with the bracket depth change of the code part.
fn scan_guest_line(line: &str) -> (usize, i32) {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0;

    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => return (i, depth),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    (line.len(), depth)
}

fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let physical: Vec<String> = source.lines().map(|l| l.replace('\t', "    ")).collect();
    let mut result = Vec::new();
    let mut i = 0;

    while i < physical.len() {
        let raw = &physical[i];
        let trimmed = raw.trim();
        let indent = raw.len() - raw.trim_start().len();
        i += 1;

        if trimmed.starts_with('#') || trimmed.is_empty() {
            result.push(LogicalLine {
                indent,
                text: trimmed.to_string(),
                swallowed: 0,
            });
            continue;
        }

        let (end, mut depth) = scan_guest_line(trimmed);
        let mut text = trimmed[..end].trim_end().to_string();
        let mut swallowed = 0;

        while depth > 0 && i < physical.len() {
            let next = physical[i].trim();
            let (end, delta) = scan_guest_line(next);
            let code = next[..end].trim();
            if !code.is_empty() {
                text.push(' ');
                text.push_str(code);
            }
            depth += delta;
            swallowed += 1;
            i += 1;
        }

        result.push(LogicalLine {
            indent,
            text,
            swallowed,
        });
    }
    result
}

/// Number of `{` without a matching `}` in native text, ignoring string
/// literals, templates and comment lines.
fn brace_balance(native: &str) -> i64 {
    let mut balance = 0i64;
    for line in native.lines() {
        if line.trim_start().starts_with("//") {
            continue;
        }
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for c in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' | '`' => quote = Some(c),
                '{' => balance += 1,
                '}' => balance -= 1,
                _ => {}
            }
        }
    }
    balance
}
