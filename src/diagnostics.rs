//! Structured diagnostics emitted by every pipeline stage.
//!
//! Stages report through a [`DiagSink`] and additionally return typed errors;
//! the driver converts those errors into `Error`/`Fatal` records so a sink
//! always sees the complete story of a compilation.

use std::fmt::Display;

use crate::lexer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Verbose,
    Status,
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Category {
    Lexical,
    Syntax,
    Semantic,
    Generate,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Lexical => f.write_str("lexical"),
            Category::Syntax => f.write_str("syntax"),
            Category::Semantic => f.write_str("semantic"),
            Category::Generate => f.write_str("generate"),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    /// Name of the module being processed, if known yet.
    pub module: Option<String>,
    pub position: Option<Span>,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let module = self.module.as_deref().unwrap_or("?");
        match &self.position {
            Some(span) => write!(
                f,
                "[{}] {}:{}:{}: {}",
                self.category,
                module,
                span.start.0 + 1,
                span.start.1 + 1,
                self.message
            ),
            None => write!(f, "[{}] {}: {}", self.category, module, self.message),
        }
    }
}

/// Receiver for diagnostic records.
pub trait DiagSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to the `log` crate.
#[derive(Default)]
pub struct LogSink;

impl DiagSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        let level = match diagnostic.severity {
            Severity::Verbose => log::Level::Trace,
            Severity::Status => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Fatal => log::Level::Error,
        };
        log::log!(level, "{diagnostic}");
    }
}

/// Collects diagnostics in memory.
#[derive(Default)]
pub struct BufferSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl BufferSink {
    pub fn new() -> BufferSink {
        BufferSink::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Error)
    }
}

impl DiagSink for BufferSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Swallows everything.
#[derive(Default)]
pub struct NullSink;

impl DiagSink for NullSink {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

pub(crate) fn report(
    sink: &mut dyn DiagSink,
    severity: Severity,
    category: Category,
    module: Option<&str>,
    position: Option<Span>,
    message: impl ToString,
) {
    sink.report(Diagnostic {
        severity,
        category,
        module: module.map(|m| m.to_string()),
        position,
        message: message.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_filters() {
        let mut sink = BufferSink::new();
        report(
            &mut sink,
            Severity::Warning,
            Category::Semantic,
            Some("main"),
            None,
            "unused symbol",
        );
        report(
            &mut sink,
            Severity::Fatal,
            Category::Syntax,
            Some("main"),
            Some(Span::default()),
            "unexpected token",
        );

        assert_eq!(sink.warnings().count(), 1);
        assert_eq!(sink.errors().count(), 1);
        assert_eq!(sink.diagnostics.len(), 2);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
