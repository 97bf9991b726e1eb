use std::fmt::{self, Display};

use strum::IntoStaticStr;

use crate::{ast::Span, value::ValueKind};

/// Result type alias for operations that can produce an evaluation error.
pub type EvalResult<T> = Result<T, JexlError>;

/// A diagnostic produced by the debugger: the reconstructed source of the
/// expression that failed, with the offending node's offsets into it.
///
/// Offsets are relative to `rendered`, not to the original source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinpoint {
    /// Offset of the first character of the offending node.
    pub start: usize,
    /// Offset one past the last character of the offending node.
    pub end: usize,
    /// The reconstructed substring `rendered[start..end]`.
    pub snippet: String,
}

/// The failure categories of parsing, evaluation and templating.
///
/// Uses a strum derive so the variant name doubles as a stable error token.
#[derive(Debug, IntoStaticStr)]
pub enum ErrorKind {
    /// The source text could not be parsed.
    Parse { position: usize, message: String },
    /// An arithmetic or comparison operand was null while the engine is strict.
    NullOperand,
    /// Division or modulus by zero.
    DivideByZero,
    /// `<`-family comparison between values with no defined ordering.
    InvalidComparison { left: ValueKind, right: ValueKind },
    /// A variable reference found nothing in the context (strict mode only).
    UnknownVariable { name: String },
    /// Method resolution found no candidate, even after narrowing.
    NoSuchMethod { name: String },
    /// Method resolution found more than one equally specific candidate.
    AmbiguousMethod { name: String },
    /// The left side of an assignment is not an assignable reference.
    BadAssignment { detail: &'static str },
    /// A sequence index fell outside the live range (strict mode; lenient
    /// access returns null instead).
    IndexOutOfRange { index: i64 },
    /// A `${…}` or `#{…}` sub-expression was still open at end of input.
    MalformedTemplate { position: usize },
    /// A value has no coercion to the required type (e.g. boolean → long).
    TypeCoercion { from: ValueKind, to: &'static str },
    /// A string lexeme could not be read as a number. Consumed internally by
    /// the `+` string-concatenation fallback, surfaced everywhere else.
    NumberFormat { image: String },
    /// Reading a script from a file failed.
    Io { path: String, source: std::io::Error },
    /// A template sub-expression failed; wraps the underlying engine error
    /// together with the sub-expression's reconstructed text.
    Template { expr: String, cause: Box<JexlError> },
}

/// An evaluation error: a failure kind, the span of the AST node it arose at,
/// and (once the engine boundary has seen it) a debugger pinpoint.
#[derive(Debug)]
pub struct JexlError {
    pub kind: ErrorKind,
    /// Span of the offending node within the original source, when known.
    pub span: Option<Span>,
    /// Reconstructed-source location, filled in by the engine's error shim.
    pub pinpoint: Option<Pinpoint>,
}

impl JexlError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            span: None,
            pinpoint: None,
        }
    }

    /// Attaches the span of the node being evaluated, keeping the innermost
    /// (first) span when the error bubbles through enclosing nodes.
    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    #[must_use]
    pub fn with_pinpoint(mut self, pinpoint: Pinpoint) -> Self {
        self.pinpoint = Some(pinpoint);
        self
    }

    /// Whether silent mode may convert this error into a null result.
    ///
    /// Ambiguous method resolution and invalid assignment targets always
    /// surface; so do parse, template and I/O failures, which happen before
    /// any evaluation starts.
    #[must_use]
    pub fn recoverable(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::AmbiguousMethod { .. }
                | ErrorKind::BadAssignment { .. }
                | ErrorKind::Parse { .. }
                | ErrorKind::MalformedTemplate { .. }
                | ErrorKind::Io { .. }
        )
    }

    /// Stable token naming the error kind, e.g. `"NullOperand"`.
    #[must_use]
    pub fn token(&self) -> &'static str {
        (&self.kind).into()
    }
}

impl Display for JexlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.pinpoint {
            write!(f, "@[{},{}]: {}\n ", p.start, p.end, p.snippet)?;
        }
        match &self.kind {
            ErrorKind::Parse { position, message } => {
                write!(f, "parse error near position {position}: {message}")
            }
            ErrorKind::NullOperand => write!(f, "null operand"),
            ErrorKind::DivideByZero => write!(f, "divide by zero"),
            ErrorKind::InvalidComparison { left, right } => {
                write!(f, "cannot compare {left} with {right}")
            }
            ErrorKind::UnknownVariable { name } => write!(f, "unknown variable '{name}'"),
            ErrorKind::NoSuchMethod { name } => write!(f, "no such method '{name}'"),
            ErrorKind::AmbiguousMethod { name } => {
                write!(f, "ambiguous method invocation '{name}'")
            }
            ErrorKind::BadAssignment { detail } => write!(f, "invalid assignment: {detail}"),
            ErrorKind::IndexOutOfRange { index } => write!(f, "index {index} out of range"),
            ErrorKind::MalformedTemplate { position } => {
                write!(f, "malformed template expression at position {position}")
            }
            ErrorKind::TypeCoercion { from, to } => write!(f, "cannot coerce {from} to {to}"),
            ErrorKind::NumberFormat { image } => write!(f, "'{image}' is not a number"),
            ErrorKind::Io { path, source } => write!(f, "cannot read '{path}': {source}"),
            ErrorKind::Template { expr, cause } => {
                write!(f, "template expression '{expr}' failed: {cause}")
            }
        }
    }
}

impl std::error::Error for JexlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io { source, .. } => Some(source),
            ErrorKind::Template { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}
