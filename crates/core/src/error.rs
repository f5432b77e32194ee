use thiserror::Error;

/// A domain value violated one of its construction invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("UserId cannot be empty")]
    EmptyUserId,

    #[error("UserId cannot exceed {max} characters")]
    UserIdTooLong { max: usize },

    #[error("UserId can only contain alphanumeric characters, underscores, and hyphens")]
    UserIdCharset,

    #[error("Invalid event area: {0}. Must be one of: user, payment, top-secret")]
    InvalidArea(String),

    #[error("Invalid event action: {0}. Must be one of: create, read, update, delete")]
    InvalidAction(String),

    #[error("Event timestamp {0} is too far in the future")]
    FutureTimestamp(String),

    #[error("EventId must be a non-empty string if provided")]
    EmptyEventId,

    #[error("Invalid NotificationId format: {0}")]
    InvalidNotificationId(String),

    #[error("Unknown limit type: {0}")]
    UnknownLimitType(String),

    #[error("Notification message cannot be empty")]
    EmptyMessage,

    #[error("Notification message cannot exceed {max} characters")]
    MessageTooLong { max: usize },
}
