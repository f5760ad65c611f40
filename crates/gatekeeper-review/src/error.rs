//! Error types for gatekeeper-review

use thiserror::Error;

/// Errors that can occur while talking to the review service
#[derive(Error, Debug)]
pub enum ReviewError {
    /// The service answered with a non-2xx status
    #[error("HTTP {status} {reason} from {url}")]
    Http {
        status: u16,
        reason: String,
        url: String,
        body: String,
    },

    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Body did not start with the anti-hijacking guard line
    #[error("response from {url} is missing the anti-hijacking prefix line")]
    MissingPrefix { url: String },

    /// JSON payload could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The current revision carries no usable fetch command
    #[error("change {change_id} has no fetch information for revision {revision}")]
    MissingFetchInfo { change_id: String, revision: String },

    /// Client configuration is unusable
    #[error("invalid review-service configuration: {0}")]
    InvalidConfig(String),
}

impl ReviewError {
    /// HTTP status code, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ReviewError::Http { status, .. } => Some(*status),
            ReviewError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Reason phrase reported alongside the status.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ReviewError::Http { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the service rejected a submit because the change cannot merge.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// Result type for review-service operations
pub type Result<T> = std::result::Result<T, ReviewError>;
