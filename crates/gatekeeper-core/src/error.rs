//! Error taxonomy for the gatekeeper pipeline.
//!
//! A failing build is not represented here: it is a `BuildResult` with
//! `success == false` and is reported as a -1 vote.

use gatekeeper_ci::SandboxError;
use gatekeeper_review::ReviewError;

/// Errors from the paste/log-hosting collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PasteError {
    #[error("paste service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("paste transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("paste storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("paste service response has no URL: {0}")]
    InvalidResponse(String),
}

/// Errors that abort testing or merging one change.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("review service error: {0}")]
    Review(#[from] ReviewError),

    #[error("paste error: {0}")]
    Paste(#[from] PasteError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Result type for gatekeeper operations.
pub type Result<T> = std::result::Result<T, CoreError>;
