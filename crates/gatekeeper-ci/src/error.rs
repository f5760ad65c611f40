//! Error types for the sandbox pipeline.
//!
//! A command exiting non-zero is not an error: it is a failed
//! `BuildResult`. These variants cover the sandbox itself and stage
//! plumbing.

use std::path::PathBuf;

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to create sandbox under {parent}: {source}")]
    Create {
        parent: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove sandbox {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pipeline has no stages")]
    EmptyPipeline,
}

/// Errors raised while launching or waiting on one stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("stage {name} has an empty command")]
    EmptyCommand { name: String },

    #[error("failed to spawn stage {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stage {name} failed while running: {source}")]
    Wait {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
