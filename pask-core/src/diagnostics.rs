use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

/// A user-facing static error, queued on the sink; checking continues after
/// reporting so one pass surfaces many errors.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[error("{message}")]
#[diagnostic(code(pask::check))]
pub struct StaticError {
    pub message: String,
    #[label]
    pub span: Span,
}

/// The error sink for both passes. Static errors are queued; internal
/// invariant violations go through [`Diagnostics::fatal`] and halt
/// compilation. An optional trace observer queues nested debug lines
/// without doing any I/O.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<StaticError>,
    trace: Vec<String>,
    trace_enabled: bool,
    depth: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that also records debug trace lines.
    pub fn with_trace() -> Self {
        Self {
            trace_enabled: true,
            ..Self::default()
        }
    }

    pub fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(StaticError {
            message: message.into(),
            span,
        });
    }

    /// An internal invariant does not hold; compilation cannot continue.
    pub fn fatal(&self, message: &str, span: Span) -> ! {
        panic!(
            "internal error: {message} (at offset {})",
            span.offset()
        );
    }

    pub fn debug_message(&mut self, message: impl Into<String>) {
        if self.trace_enabled {
            let line = format!("{}{}", "  ".repeat(self.depth), message.into());
            self.trace.push(line);
        }
    }

    pub fn inc_debug(&mut self) {
        self.depth += 1;
    }

    pub fn dec_debug(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[StaticError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<StaticError> {
        self.errors
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }
}
