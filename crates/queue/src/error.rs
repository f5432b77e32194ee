//! Queue error types.

use monitor_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message {message_id}: {source}")]
    Parse {
        message_id: String,
        #[source]
        source: ParseError,
    },

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("queue closed")]
    Closed,
}

/// Why an inbound message could not be turned into an event.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty message body")]
    Empty,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("body is not a JSON object")]
    NotAnObject,

    #[error("Invalid userId")]
    InvalidUserId,

    #[error("Invalid scope")]
    InvalidScope,

    #[error("Invalid scope format: {0}")]
    InvalidScopeFormat(String),

    #[error("Invalid area: {0}")]
    InvalidArea(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid date")]
    InvalidDate,

    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
