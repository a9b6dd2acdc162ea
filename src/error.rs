use std::fmt;
use thiserror::Error;

/// Category of a fault raised while running translated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ReferenceError,
    TypeError,
    RangeError,
    Error,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::ReferenceError => "ReferenceError",
            FaultKind::TypeError => "TypeError",
            FaultKind::RangeError => "RangeError",
            FaultKind::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Everything that can abort a run.
///
/// `Syntax` is produced when the translated text does not form a valid
/// native program (a translation artifact). `Runtime` is thrown while the
/// program executes. Both reach the caller through the same channel.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Fault {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { line: usize, message: String },

    #[error("{kind}: {message}{}", line_suffix(.line))]
    Runtime {
        kind: FaultKind,
        message: String,
        line: Option<usize>,
    },
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" (line {line})"),
        None => String::new(),
    }
}

impl Fault {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Fault::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn runtime(kind: FaultKind, message: impl Into<String>) -> Self {
        Fault::Runtime {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::runtime(FaultKind::ReferenceError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(FaultKind::TypeError, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::runtime(FaultKind::RangeError, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::runtime(FaultKind::Error, message)
    }

    /// Attaches a source line to a runtime fault that has none yet.
    pub fn at_line(self, at: usize) -> Self {
        match self {
            Fault::Runtime {
                kind,
                message,
                line: None,
            } if at > 0 => Fault::Runtime {
                kind,
                message,
                line: Some(at),
            },
            other => other,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Fault::Syntax { .. })
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Fault::Syntax { line, .. } => Some(*line),
            Fault::Runtime { line, .. } => *line,
        }
    }
}
