//! Server error types.

use crate::config::ConfigError;
use dbapi_protocol::{Operation, ProtocolError};
use hyper::StatusCode;
use thiserror::Error;

/// Rejections raised by the channel broker.
///
/// The display text is the response body sent to the caller.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Too many channels (max {max})")]
    TooManyChannels { max: usize },

    #[error("Too many messages to append (max {max} per channel)")]
    TooManyMessages { max: usize },

    #[error("Channel does not exist")]
    UnknownChannel { channel: String },

    #[error("Invalid data: {0}")]
    InvalidBatch(#[from] ProtocolError),
}

impl BrokerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BrokerError::TooManyChannels { .. } => "TOO_MANY_CHANNELS",
            BrokerError::TooManyMessages { .. } => "TOO_MANY_MESSAGES",
            BrokerError::UnknownChannel { .. } => "UNKNOWN_CHANNEL",
            BrokerError::InvalidBatch(_) => "INVALID_BATCH",
        }
    }
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("authentication required")]
    Unauthorized,

    #[error("Not Found")]
    NotFound,

    #[error("{op} expects {expected}, got {method}")]
    MethodNotAllowed {
        op: Operation,
        expected: &'static str,
        method: String,
    },

    #[error("{0} is not hosted by this server")]
    NotHosted(Operation),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ServerError {
    /// HTTP status reported to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Broker(_) | ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServerError::NotHosted(_) => StatusCode::NOT_IMPLEMENTED,
            ServerError::Io(_)
            | ServerError::Json(_)
            | ServerError::Config(_)
            | ServerError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the error counter.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Broker(e) => e.error_code(),
            ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::Unauthorized => "UNAUTHORIZED",
            ServerError::NotFound => "NOT_FOUND",
            ServerError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ServerError::NotHosted(_) => "NOT_HOSTED",
            ServerError::Io(_)
            | ServerError::Json(_)
            | ServerError::Config(_)
            | ServerError::Metrics(_) => "INTERNAL_ERROR",
        }
    }
}
