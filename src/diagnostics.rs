//! The abstract diagnostic sink plus the two concrete
//! implementations this crate ships: an in-memory [`CollectingSink`] (used
//! by unit tests and embedders that want to inspect diagnostics
//! programmatically) and a terminal [`TerminalSink`] (used by the `oslc`
//! binary).
//!
//! Severity is an error/warning/note taxonomy rather than a richer lint-rule
//! hierarchy, matching what a single-pass type checker actually needs.

use crate::token::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: SourceLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{}: {}: {}", self.loc, tag, self.message)
    }
}

/// The only interface the compiler core depends on. The core never formats
/// colours or file paths itself.
pub trait DiagnosticSink {
    fn error(&mut self, loc: &SourceLocation, message: &str);
    fn warn(&mut self, loc: &SourceLocation, message: &str);
    fn note(&mut self, loc: &SourceLocation, message: &str);

    fn error_count(&self) -> usize;
    fn warn_count(&self) -> usize;

    fn disable_colors(&self) -> bool {
        false
    }
    fn warns_as_errors(&self) -> bool {
        false
    }
    fn max_warns(&self) -> usize {
        usize::MAX
    }
    fn max_errors(&self) -> usize {
        usize::MAX
    }
}

/// Accumulates diagnostics in memory, honouring `max_errors`/`max_warns`
/// and `warns_as_errors` exactly as the abstract contract requires: once a
/// counter reaches its limit, subsequent calls of that kind are silently
/// dropped .
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
    errors: usize,
    warns: usize,
    pub warns_as_errors: bool,
    pub max_errors: usize,
    pub max_warns: usize,
    pub disable_colors: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink {
            diagnostics: Vec::new(),
            errors: 0,
            warns: 0,
            warns_as_errors: false,
            max_errors: usize::MAX,
            max_warns: usize::MAX,
            disable_colors: false,
        }
    }

    pub fn with_limits(max_errors: usize, max_warns: usize) -> Self {
        // `--max-errors` is clamped to at least 2.
        CollectingSink { max_errors: max_errors.max(2), max_warns, ..CollectingSink::new() }
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticSink for CollectingSink {
    fn error(&mut self, loc: &SourceLocation, message: &str) {
        if self.errors >= self.max_errors {
            return;
        }
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            loc: loc.clone(),
            message: message.to_string(),
        });
    }

    fn warn(&mut self, loc: &SourceLocation, message: &str) {
        if self.warns_as_errors {
            self.error(loc, message);
            return;
        }
        if self.warns >= self.max_warns {
            return;
        }
        self.warns += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            loc: loc.clone(),
            message: message.to_string(),
        });
    }

    fn note(&mut self, loc: &SourceLocation, message: &str) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Note,
            loc: loc.clone(),
            message: message.to_string(),
        });
    }

    fn error_count(&self) -> usize {
        self.errors
    }

    fn warn_count(&self) -> usize {
        self.warns
    }

    fn disable_colors(&self) -> bool {
        self.disable_colors
    }

    fn warns_as_errors(&self) -> bool {
        self.warns_as_errors
    }

    fn max_warns(&self) -> usize {
        self.max_warns
    }

    fn max_errors(&self) -> usize {
        self.max_errors
    }
}

/// ANSI SGR colour codes. Emitted only by the binary's renderer — the core
/// never touches these .
mod sgr {
    pub const RESET: &str = "\x1b[0m";
    pub const RED: &str = "\x1b[31;1m";
    pub const YELLOW: &str = "\x1b[33;1m";
    pub const CYAN: &str = "\x1b[36;1m";
    pub const BOLD: &str = "\x1b[1m";
}

/// Prints diagnostics to stderr as they arrive, with ANSI colour unless
/// `disable_colors` is set. This is the one concrete sink `oslc` wires up;
/// the core only ever sees the `DiagnosticSink` trait object.
pub struct TerminalSink {
    errors: usize,
    warns: usize,
    pub warns_as_errors: bool,
    pub max_errors: usize,
    pub max_warns: usize,
    pub disable_colors: bool,
}

impl TerminalSink {
    pub fn new(disable_colors: bool, warns_as_errors: bool, max_errors: usize, max_warns: usize) -> Self {
        TerminalSink {
            errors: 0,
            warns: 0,
            warns_as_errors,
            max_errors: max_errors.max(2),
            max_warns,
            disable_colors,
        }
    }

    fn emit(&self, colour: &str, tag: &str, loc: &SourceLocation, message: &str) {
        if self.disable_colors {
            eprintln!("{}: {}: {}", loc, tag, message);
        } else {
            eprintln!("{}{}{}{}: {}{}: {}", sgr::BOLD, loc, sgr::RESET, colour, tag, sgr::RESET, message);
        }
    }
}

impl DiagnosticSink for TerminalSink {
    fn error(&mut self, loc: &SourceLocation, message: &str) {
        if self.errors >= self.max_errors {
            return;
        }
        self.errors += 1;
        self.emit(sgr::RED, "error", loc, message);
    }

    fn warn(&mut self, loc: &SourceLocation, message: &str) {
        if self.warns_as_errors {
            self.error(loc, message);
            return;
        }
        if self.warns >= self.max_warns {
            return;
        }
        self.warns += 1;
        self.emit(sgr::YELLOW, "warning", loc, message);
    }

    fn note(&mut self, loc: &SourceLocation, message: &str) {
        self.emit(sgr::CYAN, "note", loc, message);
    }

    fn error_count(&self) -> usize {
        self.errors
    }

    fn warn_count(&self) -> usize {
        self.warns
    }

    fn disable_colors(&self) -> bool {
        self.disable_colors
    }

    fn warns_as_errors(&self) -> bool {
        self.warns_as_errors
    }

    fn max_warns(&self) -> usize {
        self.max_warns
    }

    fn max_errors(&self) -> usize {
        self.max_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.osl"), 0, 1, 0)
    }

    #[test]
    fn drops_errors_past_limit() {
        let mut sink = CollectingSink::with_limits(2, 10);
        sink.error(&loc(), "a");
        sink.error(&loc(), "b");
        sink.error(&loc(), "c");
        assert_eq!(sink.error_count(), 2);
    }

    #[test]
    fn warns_as_errors_counts_as_error() {
        let mut sink = CollectingSink::new();
        sink.warns_as_errors = true;
        sink.warn(&loc(), "careful");
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warn_count(), 0);
    }

    #[test]
    fn max_errors_clamped_to_at_least_two() {
        let sink = CollectingSink::with_limits(0, 5);
        assert_eq!(sink.max_errors, 2);
    }
}
