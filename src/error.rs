//! Error taxonomy shared by catalog resolution, marshalling and rendering.
//!
//! Every variant is fatal for the operation that raised it. Nothing here is
//! retried internally: a statement either renders completely or fails before
//! any SQL reaches the server.
use std::fmt;

use crate::catalog::Oid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The catalog does not describe this type, or describes it in a way we
    /// cannot model (pseudo types, unsupported base types, cycles).
    #[error("cannot resolve type {oid}: {reason}")]
    SchemaResolution { oid: Oid, reason: ResolutionFailure },

    /// The statement being built is malformed in a way that must never reach
    /// the server, e.g. an UPDATE without a WHERE clause.
    #[error("invalid statement: {0}")]
    StatementInvariant(String),

    /// An array value could not be encoded because its element type is not
    /// known.
    #[error("cannot encode parameter: {0}")]
    ParameterShape(String),

    /// A host value does not have the shape its descriptor requires.
    #[error("expected {expected} value, found {found}")]
    ValueMismatch { expected: String, found: String },

    /// A protocol value could not be turned back into a host value.
    #[error("cannot decode value: {0}")]
    Decode(String),

    /// SQL text handed to the placeholder numberer did not tokenize.
    #[error("malformed query text: {0}")]
    QueryText(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionFailure {
    UnknownType,
    PseudoType(String),
    UnsupportedBaseType(String),
    UnknownKind(String),
    Cycle(String),
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionFailure::UnknownType => write!(f, "no such type in catalog"),
            ResolutionFailure::PseudoType(name) => write!(f, "{} is a pseudo type", name),
            ResolutionFailure::UnsupportedBaseType(name) => {
                write!(f, "base type {} has no native representation", name)
            }
            ResolutionFailure::UnknownKind(kind) => write!(f, "unrecognized type kind {:?}", kind),
            ResolutionFailure::Cycle(name) => {
                write!(f, "composite type {} refers back to itself", name)
            }
        }
    }
}

impl Error {
    pub(crate) fn schema(oid: Oid, reason: ResolutionFailure) -> Self {
        Error::SchemaResolution { oid, reason }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::StatementInvariant(msg.into())
    }

    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::ValueMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = Error::schema(2249, ResolutionFailure::PseudoType("record".into()));
        assert_eq!(err.to_string(), "cannot resolve type 2249: record is a pseudo type");
    }

    #[test]
    fn test_invariant_display() {
        let err = Error::invariant("UPDATE requires a WHERE clause");
        assert_eq!(
            err.to_string(),
            "invalid statement: UPDATE requires a WHERE clause"
        );
    }

    #[test]
    fn test_mismatch_display() {
        let err = Error::mismatch("int4", "text");
        assert_eq!(err.to_string(), "expected int4 value, found text");
    }
}
