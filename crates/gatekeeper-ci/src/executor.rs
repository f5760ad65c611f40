//! The build seam used by the verdict and merge layers.

use async_trait::async_trait;
use tracing::info;

use crate::error::SandboxResult;
use crate::pipeline::{BuildResult, Pipeline};
use crate::stage::{FetchTarget, PipelineConfig};

/// Builds and tests one revision.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn build(&self, target: &FetchTarget) -> SandboxResult<BuildResult>;
}

/// Runs the standard clone/fetch/checkout/rebase/build pipeline in a sandbox.
#[derive(Debug, Clone, Default)]
pub struct SandboxRunner {
    config: PipelineConfig,
}

impl SandboxRunner {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[async_trait]
impl BuildRunner for SandboxRunner {
    async fn build(&self, target: &FetchTarget) -> SandboxResult<BuildResult> {
        info!(repo = %target.url, git_ref = %target.git_ref, "Testing revision");
        let pipeline = Pipeline::for_change(target, &self.config);
        pipeline.run(&self.config.sandbox_parent()).await
    }
}
