//! Error types shared by the tag codec, TLV parser, value model, and schema DSL.
//!
//! `ParseError` is the low-level error returned by [`crate::identifier`], [`crate::length`], and
//! [`crate::parser`]; [`Error`] is the public, path-annotated error returned by
//! [`crate::value::Node::load`] and friends, and wraps a `ParseError` or a schema-level fault with
//! a breadcrumb trail so callers can localize faults in nested structures (X.690 gives no such
//! diagnostics for free).

use std::fmt;

use snafu::Snafu;

use crate::tag::Tag;

/// Low-level parse failure, produced before any schema is consulted.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ParseErrorKind {
    #[snafu(display("unexpected end of input while reading {what}"))]
    Truncated { what: &'static str },
    #[snafu(display("malformed {what}"))]
    Malformed { what: &'static str },
    #[snafu(display("non-minimal long-form tag encoding"))]
    NonMinimalTag,
    #[snafu(display("non-minimal length encoding"))]
    NonMinimalLength,
    #[snafu(display("indefinite length used on a primitive-method TLV"))]
    IndefiniteOnPrimitive,
    #[snafu(display("recursion depth exceeded while parsing nested indefinite-length TLVs"))]
    DepthExceeded,
    #[snafu(display("trailing bytes after the outermost TLV in strict mode"))]
    TrailingBytes,
}

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: Option<usize>,
}

impl ParseError {
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = self.offset.or(Some(offset));
        self
    }
}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> Self {
        Self { kind, offset: None }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (at offset {offset})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// One segment of the breadcrumb trail accumulated while descending into a schema.
#[derive(Debug, Clone)]
pub enum PathSegment {
    Field(String),
    Index(usize),
    ChoiceAlternative(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::ChoiceAlternative(name) => write!(f, "<{name}>"),
        }
    }
}

/// The schema-level error kinds named in the specification's error-handling design.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ErrorKind {
    #[snafu(display("{inner}"))]
    Parse { inner: ParseErrorKind },
    /// Parsed `(class, tag)` did not match what the spec expected, including Choice no-match and
    /// explicit-tag header mismatch.
    #[snafu(display("unexpected tag {found:?}, expected one of {expected:?}"))]
    UnexpectedTag { expected: Vec<Tag>, found: Tag },
    /// A required field of a `Set` was never filled during parsing.
    #[snafu(display("missing required field `{field}`"))]
    MissingField { field: String },
    /// A primitive-specific value constraint was violated (non-ASCII octet in an ASCII string,
    /// malformed time, OID subidentifier with no terminating octet, unmapped enumerated value).
    #[snafu(display("invalid value: {what}"))]
    InvalidValue { what: String },
    /// A static configuration fault in a spec, e.g. implicit tagging on a Choice.
    #[snafu(display("schema error: {what}"))]
    SchemaError { what: String },
}

/// The public error type returned from `load`, `dump`, and structural accessors.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub path: Vec<PathSegment>,
    pub offset: Option<usize>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: Vec::new(),
            offset: None,
        }
    }

    /// Prepends a path segment as the error unwinds through nested `load` calls, so the
    /// outermost caller sees the full field-path chain from the root.
    pub fn with_segment(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingField {
            field: field.into(),
        })
    }

    pub fn invalid_value(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidValue { what: what.into() })
    }

    pub fn schema_error(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaError { what: what.into() })
    }

    pub fn unexpected_tag(expected: Vec<Tag>, found: Tag) -> Self {
        Self::new(ErrorKind::UnexpectedTag { expected, found })
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Self {
            offset: err.offset,
            kind: ErrorKind::Parse { inner: err.kind },
            path: Vec::new(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<root>")?;
        for segment in &self.path {
            write!(f, "{segment}")?;
        }
        write!(f, ": {}", self.kind)?;
        if let Some(offset) = self.offset {
            write!(f, " at offset {offset}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
