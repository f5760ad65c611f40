//! Gatekeeper CI - sandboxed build pipeline
//!
//! Provides the build half of the gatekeeper:
//! - Creates a disposable sandbox per run
//! - Executes an ordered list of shell stages, stopping at the first failure
//! - Captures a shell-session transcript of everything that ran
//! - Guarantees the sandbox is removed on every exit path

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod runner;
pub mod sandbox;
pub mod stage;

// Re-export key types
pub use error::{SandboxError, SandboxResult, StageError};
pub use executor::{BuildRunner, SandboxRunner};
pub use pipeline::{round_to_secs, BuildResult, Pipeline};
pub use runner::{StageResult, StageRunner};
pub use sandbox::Sandbox;
pub use stage::{quote, BuiltinStage, FetchTarget, PipelineConfig, StageConfig};
