//! Error types for the manager interface

use thiserror::Error;

/// Errors raised by manager actions
#[derive(Debug, Error)]
pub enum ManagerError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success HTTP status
    #[error("HTTP status {status} for {action}")]
    HttpStatus { action: String, status: u16 },

    /// Transport failure outside HTTP (closed limiter, simulated outage)
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint does not form a valid URI
    #[error("invalid manager URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Body could not be split into result sets
    #[error("malformed result set: {0}")]
    Malformed(String),

    /// Result set lacks the `Response` key
    #[error("{action} reply has no Response key")]
    MissingResponse { action: String },

    /// `Response` status differs from the one expected
    #[error(
        "{action} failed: expected {expected}, got {status}{}",
        .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
    )]
    Status {
        action: String,
        expected: String,
        status: String,
        message: Option<String>,
    },

    /// An event in an enumeration lacks the `Event` key
    #[error("{action} enumeration contains a result set without Event key")]
    MissingEvent { action: String },

    /// Enumeration did not end with the completion event
    #[error("{action} enumeration did not end with {expected}")]
    MissingComplete { action: String, expected: String },
}

impl ManagerError {
    /// Whether the failure happened below the manager protocol
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ManagerError::Http(_) | ManagerError::HttpStatus { .. } | ManagerError::Transport(_)
        )
    }
}
