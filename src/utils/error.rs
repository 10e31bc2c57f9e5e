//! The `error` module defines the error type shared by the whole bridge.
//!
//! Task-level variants (`UnsupportedElement`, `AmbiguousFanOut`, formatting
//! and topic errors) never escape the dispatcher: their message is published
//! to the task's error topic. Schedule variants are logged at startup and the
//! offending entry is skipped. The remaining variants surface while loading
//! configuration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A path segment has no registered handler or field.
    #[error("element '{element}' in '{path}' is not supported")]
    UnsupportedElement { element: String, path: String },

    /// A task produced several values for a topic without wildcard.
    #[error("result of task '{task}' has several values but topic '{topic}' doesn't contain a wildcard")]
    AmbiguousFanOut { task: String, topic: String },

    #[error("format '{format}' cannot be applied: {reason}")]
    FormatIncompatible { format: String, reason: String },

    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    #[error("topic '{0}' has no wildcard")]
    MalformedTopic(String),

    #[error("'{0}' is not a recurring schedule")]
    NonRecurringSchedule(String),

    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// Failure reported by a value handler.
    #[error("{0}")]
    Handler(String),

    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn unsupported(element: &str, path: &str) -> Self {
        Error::UnsupportedElement {
            element: element.to_string(),
            path: path.to_string(),
        }
    }

    pub(crate) fn incompatible(format: &str, reason: impl Into<String>) -> Self {
        Error::FormatIncompatible {
            format: format.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_schedule(expression: &str, reason: impl Into<String>) -> Self {
        Error::InvalidSchedule {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
