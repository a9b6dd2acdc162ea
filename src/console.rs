//! Outward-facing sinks: the console surface that mirrors printed lines and
//! the notification channel for short user-facing messages.

use log::{info, warn};
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// How a console line is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Log,
    Error,
    Info,
}

/// Append-only console surface.
pub trait ConsoleSink {
    fn write(&mut self, style: LineStyle, text: &str);

    /// Empties the surface. Called at the start of every run.
    fn clear(&mut self);
}

/// Writes log and info lines to stdout and error lines to stderr.
#[derive(Debug, Default)]
pub struct StdConsole;

impl ConsoleSink for StdConsole {
    fn write(&mut self, style: LineStyle, text: &str) {
        // a closed pipe only loses console output
        let _ = match style {
            LineStyle::Error => writeln!(io::stderr(), "{text}"),
            LineStyle::Log | LineStyle::Info => writeln!(io::stdout(), "{text}"),
        };
    }

    fn clear(&mut self) {}
}

/// In-memory console. Clones share the same buffer, so a test can keep one
/// and hand the other to a sandbox.
#[derive(Debug, Clone, Default)]
pub struct BufferConsole {
    lines: Rc<RefCell<Vec<(LineStyle, String)>>>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LineStyle, String)> {
        self.lines.borrow().clone()
    }

    pub fn styled(&self, style: LineStyle) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(s, _)| *s == style)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl ConsoleSink for BufferConsole {
    fn write(&mut self, style: LineStyle, text: &str) {
        self.lines.borrow_mut().push((style, text.to_string()));
    }

    fn clear(&mut self) {
        self.lines.borrow_mut().clear();
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Info => write!(f, "INFO"),
            NotificationKind::Success => write!(f, "SUCCESS"),
            NotificationKind::Error => write!(f, "ERROR"),
        }
    }
}

/// Transient user-facing messages ("toasts").
pub trait NotificationSink {
    fn notify(&mut self, kind: NotificationKind, message: &str);
}

/// Routes notifications into the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => warn!("[{kind}] {message}"),
            NotificationKind::Info | NotificationKind::Success => info!("[{kind}] {message}"),
        }
    }
}

/// Keeps every notification; clones share history.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    history: Rc<RefCell<Vec<(NotificationKind, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<(NotificationKind, String)> {
        self.history.borrow().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&mut self, kind: NotificationKind, message: &str) {
        self.history.borrow_mut().push((kind, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_clones_share_lines() {
        let console = BufferConsole::new();
        let mut writer = console.clone();
        writer.write(LineStyle::Log, "hello");
        writer.write(LineStyle::Error, "boom");
        assert_eq!(console.styled(LineStyle::Log), vec!["hello".to_string()]);
        assert_eq!(console.styled(LineStyle::Error), vec!["boom".to_string()]);

        writer.clear();
        assert!(console.lines().is_empty());
    }

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        let mut sink = notifier.clone();
        sink.notify(NotificationKind::Error, "first");
        sink.notify(NotificationKind::Info, "second");
        let history = notifier.history();
        assert_eq!(history[0], (NotificationKind::Error, "first".to_string()));
        assert_eq!(history[1].1, "second");
    }
}
