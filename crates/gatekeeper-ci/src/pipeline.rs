//! Ordered stage execution in a throwaway sandbox.

use crate::error::{SandboxError, SandboxResult};
use crate::runner::{StageResult, StageRunner};
use crate::sandbox::Sandbox;
use crate::stage::{BuiltinStage, FetchTarget, PipelineConfig, StageConfig};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Whether every stage exited zero.
    pub success: bool,

    /// Shell-session transcript: each command echoed with `$ `, then its output.
    pub output: String,

    /// Wall-clock time of the stage loop, rounded to whole seconds.
    pub elapsed: Duration,

    /// Per-stage results, up to and including the first failure.
    pub stages: Vec<StageResult>,
}

impl BuildResult {
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }

    /// Number of stages that passed.
    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|s| s.passed()).count()
    }

    /// The stage that stopped the pipeline, if any.
    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.passed())
    }
}

/// Round to the nearest whole second.
pub fn round_to_secs(elapsed: Duration) -> Duration {
    Duration::from_secs(elapsed.as_secs_f64().round() as u64)
}

/// A non-empty, ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<StageConfig>,
}

impl Pipeline {
    pub fn new(stages: Vec<StageConfig>) -> SandboxResult<Self> {
        if stages.is_empty() {
            return Err(SandboxError::EmptyPipeline);
        }
        Ok(Self { stages })
    }

    /// Pipeline of plain command lines, named `step-1`, `step-2`, ...
    pub fn from_commands<I, S>(commands: I, timeout_secs: u64) -> SandboxResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stages = commands
            .into_iter()
            .enumerate()
            .map(|(i, cmd)| StageConfig::custom(format!("step-{}", i + 1), cmd, timeout_secs))
            .collect();
        Self::new(stages)
    }

    /// clone, fetch, checkout, rebase, build.
    pub fn for_change(target: &FetchTarget, config: &PipelineConfig) -> Self {
        Self {
            stages: BuiltinStage::ALL
                .iter()
                .map(|stage| StageConfig::from_builtin(*stage, target, config))
                .collect(),
        }
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    /// Run every stage in a fresh sandbox under `sandbox_parent`.
    ///
    /// Stops at the first stage that does not exit zero. Sandbox creation
    /// and spawn failures are folded into a failed result with the error
    /// text in the transcript. The sandbox is removed before returning; the
    /// only `Err` is a removal failure other than "already absent".
    pub async fn run(&self, sandbox_parent: &Path) -> SandboxResult<BuildResult> {
        let mut output = String::new();
        let mut stage_results = Vec::new();
        let mut success = true;

        let sandbox = match Sandbox::create_in(sandbox_parent) {
            Ok(sandbox) => Some(sandbox),
            Err(e) => {
                warn!(error = %e, "could not create sandbox");
                success = false;
                output.push_str(&format!("{e}\n"));
                None
            }
        };

        let mut elapsed = Duration::ZERO;
        if let Some(sandbox) = &sandbox {
            let start = Instant::now();
            for config in &self.stages {
                info!(stage = %config.name, "Executing stage");
                output.push_str(&format!("$ {}\n", config.command));

                let result = match StageRunner::execute_stage(config, sandbox.path()).await {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(stage = %config.name, error = %e, "stage could not run");
                        success = false;
                        output.push_str(&format!("{e}\n"));
                        break;
                    }
                };

                output.push_str(&result.output);
                if !result.output.is_empty() && !result.output.ends_with('\n') {
                    output.push('\n');
                }
                if result.timed_out {
                    output.push_str(&format!(
                        "stage '{}' timed out after {}s\n",
                        config.name, config.timeout_secs
                    ));
                }

                let passed = result.passed();
                info!(
                    stage = %config.name,
                    exit_code = ?result.exit_code,
                    duration_ms = result.duration_ms,
                    passed,
                    "Stage finished"
                );
                stage_results.push(result);
                if !passed {
                    success = false;
                    break;
                }
            }
            elapsed = round_to_secs(start.elapsed());
        }

        if let Some(sandbox) = sandbox {
            sandbox.destroy()?;
        }

        Ok(BuildResult {
            success,
            output,
            elapsed,
            stages: stage_results,
        })
    }
}
