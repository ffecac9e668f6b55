//! The error taxonomy of spec.md §7.
//!
//! Every pass returns `Result<T, Vec<Diagnostic>>` rather than bailing on
//! the first problem, so a single invocation can surface every user error
//! of a pass at once (spec.md §7: "compilation halts after collecting all
//! errors of a pass so multiple can be reported per invocation"). The two
//! implementation-bug variants (`UnsupportedLowering`'s sibling
//! `BackendInvariantViolated`, and `BuiltinSnippetMissing`) are still
//! represented as `Diagnostic` values so callers can log them uniformly,
//! but `Session::compile` turns them into a panic rather than returning
//! them — see [`crate::session`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A zero-based line/column position plus the originating file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// The full taxonomy from spec.md §7.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// Surfaced verbatim from the (external) front end; the core never
    /// constructs this variant itself.
    SyntaxInvalid { file: String, pos: SourcePos, message: String },
    DuplicateIdentifier { file: String, pos: SourcePos, name: String },
    UnresolvedIdentifier { file: String, pos: SourcePos, name: String },
    TypeMismatch { file: String, pos: SourcePos, expected: String, found: String },
    ConstReassigned { file: String, pos: SourcePos, name: String },
    MissingReturn { file: String, pos: SourcePos, function_name: String },
    ArityMismatch { file: String, pos: SourcePos, expected: usize, found: usize },
    UnsupportedLowering { file: String, pos: SourcePos, construct: String },
    BuiltinSnippetMissing { name: String },
    BackendInvariantViolated { message: String },
}

impl Diagnostic {
    /// True for the first seven variants of spec.md §7 (user errors that a
    /// pass should *collect* rather than abort on); false for the last two
    /// (implementation bugs that abort immediately).
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Diagnostic::BuiltinSnippetMissing { .. } | Diagnostic::BackendInvariantViolated { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SyntaxInvalid { file, pos, message } => {
                write!(f, "{file}:{pos}: syntax error: {message}")
            }
            Diagnostic::DuplicateIdentifier { file, pos, name } => {
                write!(f, "{file}:{pos}: duplicate identifier `{name}`")
            }
            Diagnostic::UnresolvedIdentifier { file, pos, name } => {
                write!(f, "{file}:{pos}: cannot resolve identifier `{name}`")
            }
            Diagnostic::TypeMismatch { file, pos, expected, found } => {
                write!(f, "{file}:{pos}: expected type `{expected}`, found `{found}`")
            }
            Diagnostic::ConstReassigned { file, pos, name } => {
                write!(f, "{file}:{pos}: cannot assign to immutable binding `{name}`")
            }
            Diagnostic::MissingReturn { file, pos, function_name } => {
                write!(f, "{file}:{pos}: function `{function_name}` is missing a return on some path")
            }
            Diagnostic::ArityMismatch { file, pos, expected, found } => {
                write!(f, "{file}:{pos}: expected {expected} argument(s), found {found}")
            }
            Diagnostic::UnsupportedLowering { file, pos, construct } => {
                write!(f, "{file}:{pos}: unsupported construct cannot be lowered: {construct}")
            }
            Diagnostic::BuiltinSnippetMissing { name } => {
                write!(f, "internal error: built-in snippet `{name}` is missing")
            }
            Diagnostic::BackendInvariantViolated { message } => {
                write!(f, "internal error: backend invariant violated: {message}")
            }
        }
    }
}

impl std::error::Error for Diagnostic {}

/// Accumulates diagnostics for a single pass, matching spec.md §7's
/// "collect all errors of a pass" policy.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("diagnostic recorded: {diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Consumes the bag, returning `Err` if anything was recorded.
    pub fn into_result<T>(self, ok: T) -> Result<T, Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(ok)
        } else {
            Err(self.diagnostics)
        }
    }
}
