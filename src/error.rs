//! Error types for schema resolution and stream decoding.

use std::fmt;
use thiserror::Error;

/// Which side is at fault for a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The input bytes are truncated, malformed or fail a match constraint.
    Data,
    /// The schema (or an expression in it) is wrong for this input.
    Schema,
    /// The underlying byte source failed.
    Io,
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Record(String),
    Field(String),
    Index(u64),
}

/// Location of a failure inside the decoded value tree, e.g. `Psd.layers[3].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(pub Vec<PathSegment>);

impl FieldPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in &self.0 {
            match seg {
                PathSegment::Record(name) => {
                    if first {
                        write!(f, "{}", name)?;
                    } else {
                        write!(f, "<{}>", name)?;
                    }
                }
                PathSegment::Field(name) => {
                    if first {
                        write!(f, "{}", name)?;
                    } else {
                        write!(f, ".{}", name)?;
                    }
                }
                PathSegment::Index(i) => write!(f, "[{}]", i)?,
            }
            first = false;
        }
        Ok(())
    }
}

/// Errors raised while decoding a stream against a schema.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    #[error("range of {requested} bytes exceeds the {available} bytes left in the enclosing range")]
    RangeExceedsEnclosing { requested: u64, available: u64 },
    #[error("malformed {encoding} string: {reason}")]
    MalformedEncoding { encoding: &'static str, reason: String },
    #[error("value read in {field} does not match: expected {expected}, found {actual}")]
    Validation {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("expression `{expr}`: {reason}")]
    Expression { expr: String, reason: String },
    #[error("schema contract violated: {0}")]
    SchemaContract(String),
    #[error("IO: {0}")]
    Io(std::io::Error),
    #[error("{path} (field starts at byte {offset}): {source}")]
    At {
        path: FieldPath,
        offset: u64,
        #[source]
        source: Box<DecodeError>,
    },
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEndOfStream
        } else {
            DecodeError::Io(e)
        }
    }
}

impl DecodeError {
    pub(crate) fn contract(msg: impl Into<String>) -> Self {
        DecodeError::SchemaContract(msg.into())
    }

    pub(crate) fn malformed(encoding: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::MalformedEncoding {
            encoding,
            reason: reason.into(),
        }
    }

    /// Prefix the error location with `segment`. The first wrap records `offset`;
    /// outer wraps only extend the path.
    pub(crate) fn within(self, segment: PathSegment, offset: u64) -> Self {
        match self {
            DecodeError::At {
                mut path,
                offset,
                source,
            } => {
                path.0.insert(0, segment);
                DecodeError::At {
                    path,
                    offset,
                    source,
                }
            }
            other => DecodeError::At {
                path: FieldPath(vec![segment]),
                offset,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with all path context stripped.
    pub fn root_cause(&self) -> &DecodeError {
        match self {
            DecodeError::At { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Field path of the failure, if the error was raised inside a record.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            DecodeError::At { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Byte offset at which the innermost failing field started.
    pub fn offset(&self) -> Option<u64> {
        match self {
            DecodeError::At { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.root_cause() {
            DecodeError::UnexpectedEndOfStream
            | DecodeError::RangeExceedsEnclosing { .. }
            | DecodeError::MalformedEncoding { .. }
            | DecodeError::Validation { .. } => ErrorCategory::Data,
            DecodeError::Expression { .. } | DecodeError::SchemaContract(_) => {
                ErrorCategory::Schema
            }
            DecodeError::Io(_) => ErrorCategory::Io,
            DecodeError::At { .. } => ErrorCategory::Data,
        }
    }

    pub fn is_schema_error(&self) -> bool {
        self.category() == ErrorCategory::Schema
    }
}

/// Errors raised while parsing or resolving a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("duplicate type name: {0}")]
    DuplicateName(String),
    #[error("unknown type {name} referenced by {record}.{field}")]
    UnknownType {
        record: String,
        field: String,
        name: String,
    },
    #[error("enum {0} has no variants")]
    EmptyEnum(String),
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),
    #[error("schema declares no records")]
    NoRecords,
}
