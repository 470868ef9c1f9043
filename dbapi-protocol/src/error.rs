//! Protocol error types and error kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while describing schemas, validating requests, or
/// encoding and decoding the textual framings.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid identifier {ident:?}: {reason}")]
    InvalidIdentifier { ident: String, reason: &'static str },

    #[error("unknown field '{field}' for record {record}")]
    UnknownField { record: String, field: String },

    #[error("record {record} has no identity field")]
    MissingIdentity { record: String },

    #[error("record {record} has no encodable fields")]
    EmptySchema { record: String },

    #[error("field '{field}' of {record} is unsigned; unsigned columns are not allowed")]
    UnsignedNotAllowed { record: String, field: String },

    #[error("cannot convert {text:?} to {expected}: {reason}")]
    Conversion {
        expected: String,
        text: String,
        reason: String,
    },

    #[error("type mismatch for field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("malformed {framing} framing: {reason}")]
    MalformedFrame {
        framing: &'static str,
        reason: String,
    },

    #[error("field count mismatch: expected {expected}, got {actual}")]
    FieldCountMismatch { expected: usize, actual: usize },
}

impl ProtocolError {
    /// Returns the stable error kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::InvalidIdentifier { .. }
            | ProtocolError::UnknownField { .. }
            | ProtocolError::MissingIdentity { .. } => ErrorKind::Validation,
            ProtocolError::EmptySchema { .. } | ProtocolError::UnsignedNotAllowed { .. } => {
                ErrorKind::Schema
            }
            ProtocolError::Conversion { .. } | ProtocolError::TypeMismatch { .. } => {
                ErrorKind::Conversion
            }
            ProtocolError::MalformedFrame { .. } | ProtocolError::FieldCountMismatch { .. } => {
                ErrorKind::Protocol
            }
        }
    }

    pub(crate) fn conversion(
        expected: impl fmt::Display,
        text: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ProtocolError::Conversion {
            expected: expected.to_string(),
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(framing: &'static str, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedFrame {
            framing,
            reason: reason.into(),
        }
    }
}

/// Stable error kinds shared by the protocol and client layers.
///
/// These kinds are part of the public contract and must remain stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed identifier or unknown predicate field. Detected before I/O.
    Validation,
    /// A record type with nothing encodable.
    Schema,
    /// A value does not match its declared semantic type.
    Conversion,
    /// An update was requested for a record without a snapshot.
    Tracking,
    /// Malformed framing.
    Protocol,
    /// Non-success response from the remote service.
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "VALIDATION"),
            ErrorKind::Schema => write!(f, "SCHEMA"),
            ErrorKind::Conversion => write!(f, "CONVERSION"),
            ErrorKind::Tracking => write!(f, "TRACKING"),
            ErrorKind::Protocol => write!(f, "PROTOCOL"),
            ErrorKind::Transport => write!(f, "TRANSPORT"),
        }
    }
}
