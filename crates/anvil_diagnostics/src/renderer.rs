//! Rendering messages for a terminal.

use std::io::Write;
use std::sync::Mutex;

use crate::category::ReportCategory;
use crate::message::Message;
use crate::sink::MessageSink;

/// Formats messages into display strings.
pub trait MessageRenderer {
    /// Renders a single message (no trailing newline).
    fn render(&self, message: &Message) -> String;
}

/// Renders messages in a compact `severity: text` form.
///
/// Compiler console lines (compiler messages at `Info`) and output messages are
/// passed through untouched so they read exactly as the compiler printed them.
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

impl MessageRenderer for TerminalRenderer {
    fn render(&self, message: &Message) -> String {
        let raw = match message.category {
            ReportCategory::OutputMessage => true,
            ReportCategory::CompilerMessage => message.severity == crate::ReportSeverity::Info,
            _ => false,
        };
        if raw {
            return message.text.clone();
        }
        let label = match message.category {
            ReportCategory::CompilerMessage => message.severity.to_string(),
            other => format!("{}[{other}]", message.severity),
        };
        let label = match message.severity {
            crate::ReportSeverity::Error => self.paint("1;31", &label),
            crate::ReportSeverity::Warning => self.paint("1;33", &label),
            _ => label,
        };
        format!("{label}: {}", message.text)
    }
}

/// A sink that renders each message straight to a writer (stderr by default).
pub struct TerminalSink<W: Write + Send = std::io::Stderr> {
    renderer: TerminalRenderer,
    out: Mutex<W>,
}

impl TerminalSink {
    /// Creates a sink writing to stderr.
    pub fn stderr(color: bool) -> Self {
        Self::with_writer(color, std::io::stderr())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// Creates a sink writing to an arbitrary writer.
    pub fn with_writer(color: bool, out: W) -> Self {
        Self {
            renderer: TerminalRenderer::new(color),
            out: Mutex::new(out),
        }
    }

    /// Consumes the sink and returns the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> MessageSink for TerminalSink<W> {
    fn report(&self, message: Message) {
        let line = self.renderer.render(&message);
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        // A closed stderr must not abort the build.
        let _ = writeln!(out, "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::ReportSeverity;

    #[test]
    fn renders_compiler_message() {
        let r = TerminalRenderer::new(false);
        let m = Message::compiler(ReportSeverity::Warning, "a.src:1: unused variable");
        assert_eq!(r.render(&m), "warning: a.src:1: unused variable");
    }

    #[test]
    fn renders_other_categories_with_tag() {
        let r = TerminalRenderer::new(false);
        let m = Message::new(ReportCategory::DaemonMessage, ReportSeverity::Info, "daemon up");
        assert_eq!(r.render(&m), "info[daemon]: daemon up");
    }

    #[test]
    fn console_and_output_pass_through() {
        let r = TerminalRenderer::new(true);
        assert_eq!(r.render(&Message::console("raw line")), "raw line");
        let m = Message::new(ReportCategory::OutputMessage, ReportSeverity::Info, "out/A.class");
        assert_eq!(r.render(&m), "out/A.class");
    }

    #[test]
    fn color_wraps_errors() {
        let r = TerminalRenderer::new(true);
        let out = r.render(&Message::compiler(ReportSeverity::Error, "boom"));
        assert!(out.starts_with("\x1b[1;31merror\x1b[0m"));
    }

    #[test]
    fn sink_writes_lines() {
        let sink = TerminalSink::with_writer(false, Vec::new());
        sink.report(Message::console("one"));
        sink.report(Message::compiler(ReportSeverity::Debug, "two"));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "one\ndebug: two\n");
    }
}
