//! Error types for the tracking engine.

use crate::types::{CategoryId, TopicId};
use thiserror::Error;

/// Main error type for tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Malformed message: {0}")]
    Decode(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Missing field {field} in {message_type} message")]
    MissingField {
        message_type: String,
        field: &'static str,
    },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid notification level: {0}")]
    InvalidNotificationLevel(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("Category cycle detected at {0}")]
    CategoryCycle(CategoryId),

    #[error("Topic not tracked: {0}")]
    TopicNotFound(TopicId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Serialization(e.to_string())
    }
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
