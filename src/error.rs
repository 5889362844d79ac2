//! Error types for parsing, compilation, and evaluation.
//!
//! [`ParseError`] is produced while parsing page source, [`CompileError`]
//! while building the macro registry and dispatch table, and [`EvalError`]
//! while evaluating a request. All of them carry source spans so they can be
//! rendered against the page text with `format_with_source`.

use crate::ast::span::Span;
use std::sync::Arc;
use thiserror::Error;

// ── Parse errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context for display
    pub fn format_with_source(&self, source: &str, entry_name: Option<&str>) -> String {
        format_snippet(
            source,
            entry_name,
            self.span,
            &self.message,
            self.hint.as_deref(),
        )
    }
}

// ── Compile errors ──────────────────────────────────────────────────────

/// An error found while compiling a parsed page. These are fatal for the
/// page: it never gets a dispatch table.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Span,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    pub fn duplicate_macro(name: &str, span: Span) -> Self {
        Self::new(
            CompileErrorKind::DuplicateMacro,
            span,
            format!("macro `{name}` is already defined"),
        )
    }

    pub fn duplicate_method(method: &str, span: Span) -> Self {
        Self::new(
            CompileErrorKind::DuplicateMethod,
            span,
            format!("method \"{method}\" already has a response"),
        )
    }

    pub fn duplicate_root(span: Span) -> Self {
        Self::new(
            CompileErrorKind::DuplicateRoot,
            span,
            "a page may declare only one root expression",
        )
    }

    pub fn format_with_source(&self, source: &str, entry_name: Option<&str>) -> String {
        format_snippet(source, entry_name, self.span, &self.message, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    DuplicateMacro,
    DuplicateMethod,
    DuplicateRoot,
    UnknownMacro,
    UnknownVariant,
    UnknownField,
    DuplicateField,
}

// ── Eval errors ─────────────────────────────────────────────────────────

/// An error that occurs while evaluating a request against a compiled page.
///
/// Carries a structured [`EvalErrorKind`], a human-readable message,
/// an optional source [`Span`], and an optional underlying error cause.
/// Evaluation is deterministic, so retrying a failed evaluation fails the
/// same way.
///
/// # Error chaining
///
/// A [`Builtin`](crate::registry::Builtin) that fails because of some
/// underlying error can preserve it with [`with_source`](EvalError::with_source):
///
/// ```rust
/// use pagelang::EvalError;
///
/// fn example(raw: &str) -> Result<u32, EvalError> {
///     raw.parse::<u32>()
///         .map_err(|e| EvalError::builtin_error("count", "not a number").with_source(e))
/// }
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Option<Span>,
    pub message: String,
    /// The underlying error that caused this evaluation error, if any.
    ///
    /// Wrapped in `Arc` so that `EvalError` remains `Clone`.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a span only if the error does not already point somewhere
    /// more specific.
    pub fn or_span(self, span: Span) -> Self {
        if self.span.is_none() {
            self.with_span(span)
        } else {
            self
        }
    }

    /// Attach an underlying error cause to this evaluation error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn format_with_source(&self, source: &str, entry_name: Option<&str>) -> String {
        match self.span {
            Some(span) => format_snippet(source, entry_name, span, &self.message, None),
            None => format!("Error: {}", self.message),
        }
    }

    // Convenience constructors for common error types

    pub fn unknown_macro(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UnknownMacro,
            format!("unknown macro: {name}"),
        )
    }

    pub fn type_mismatch(expected: &str, got: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeMismatch,
            format!("expected {expected}, got {got}"),
        )
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            EvalErrorKind::IndexOutOfRange,
            format!("index {index} out of range for list of length {len}"),
        )
    }

    pub fn slice_out_of_range(lo: i64, hi: i64, len: usize) -> Self {
        Self::new(
            EvalErrorKind::IndexOutOfRange,
            format!("slice {lo}..<{hi} out of range for list of length {len}"),
        )
    }

    pub fn no_default_response(method: &str) -> Self {
        Self::new(
            EvalErrorKind::NoDefaultResponse,
            format!("no response for method \"{method}\" and no root expression declared"),
        )
    }

    /// A builtin was called with an argument of the wrong type.
    pub fn builtin_argument(name: &str, expected: &str, got: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeMismatch,
            format!("builtin `{name}` expected {expected}, got {got}"),
        )
    }

    pub fn builtin_error(name: &str, message: impl AsRef<str>) -> Self {
        Self::new(
            EvalErrorKind::BuiltinError,
            format!("builtin `{name}` failed: {}", message.as_ref()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    UnknownMacro,
    UnknownVariant,
    UnknownField,
    TypeMismatch,
    IndexOutOfRange,
    NoDefaultResponse,
    /// Macro calls nested deeper than the configured call depth.
    RecursionLimit,
    /// The evaluation exceeded the configured node evaluation budget.
    ResourceLimit,
    /// A builtin rejected its argument for a reason other than its type.
    BuiltinError,
}

// ── Source snippets ─────────────────────────────────────────────────────

fn format_snippet(
    source: &str,
    entry_name: Option<&str>,
    span: Span,
    message: &str,
    hint: Option<&str>,
) -> String {
    let (line, col) = span.line_col(source);
    let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

    let location = if let Some(name) = entry_name {
        format!(" --> {name}:{line}:{col}")
    } else {
        format!(" --> {line}:{col}")
    };

    // Underline no further than the end of the line the span starts on.
    let remaining = source_line.chars().count().saturating_sub(col - 1);
    let width = span.len().min(remaining).max(1);
    let pointer = " ".repeat(col.saturating_sub(1)) + &"^".repeat(width);

    let mut output =
        format!("Error: {message}\n{location}\n  |\n{line:>3} | {source_line}\n    | {pointer}");

    if let Some(hint) = hint {
        output.push_str(&format!("\n  = hint: {hint}"));
    }

    output
}
