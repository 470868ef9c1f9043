//! Client error types.

use crate::tracker::TrackHandle;
use dbapi_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("record {handle} is not tracked in table '{table}'")]
    NotTracked { table: String, handle: TrackHandle },

    #[error("server returned {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    /// Returns the stable error kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Protocol(e) => e.kind(),
            ClientError::NotTracked { .. } => ErrorKind::Tracking,
            ClientError::Transport { .. } | ClientError::Http(_) => ErrorKind::Transport,
            ClientError::Json(_) => ErrorKind::Protocol,
            ClientError::InvalidConfig(_) => ErrorKind::Validation,
        }
    }

    /// Status code of a non-success response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
