//! Pipeline stage definitions and configuration.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;

/// Where the revision under test lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchTarget {
    /// Repository URL to clone and fetch from.
    pub url: String,

    /// Ref holding the revision, e.g. `refs/changes/65/3965/2`.
    pub git_ref: String,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, git_ref: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            git_ref: git_ref.into(),
        }
    }
}

/// The fixed steps every change goes through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinStage {
    /// git clone <url> .
    Clone,

    /// git fetch <url> <ref>
    Fetch,

    /// git checkout FETCH_HEAD
    Checkout,

    /// git rebase <mainline>
    Rebase,

    /// The project's own build/test command
    Build,
}

impl BuiltinStage {
    /// All stages in execution order.
    pub const ALL: [BuiltinStage; 5] = [
        BuiltinStage::Clone,
        BuiltinStage::Fetch,
        BuiltinStage::Checkout,
        BuiltinStage::Rebase,
        BuiltinStage::Build,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinStage::Clone => "clone",
            BuiltinStage::Fetch => "fetch",
            BuiltinStage::Checkout => "checkout",
            BuiltinStage::Rebase => "rebase",
            BuiltinStage::Build => "build",
        }
    }

    /// Shell command line for this stage.
    pub fn command(&self, target: &FetchTarget, config: &PipelineConfig) -> String {
        match self {
            BuiltinStage::Clone => format!("git clone {} .", quote(&target.url)),
            BuiltinStage::Fetch => {
                format!("git fetch {} {}", quote(&target.url), quote(&target.git_ref))
            }
            BuiltinStage::Checkout => "git checkout FETCH_HEAD".to_string(),
            BuiltinStage::Rebase => format!("git rebase {}", quote(&config.mainline)),
            BuiltinStage::Build => config.build_command.clone(),
        }
    }

    /// Timeout that applies to this stage.
    pub fn timeout_secs(&self, config: &PipelineConfig) -> u64 {
        match self {
            BuiltinStage::Build => config.build_timeout_secs,
            _ => config.git_timeout_secs,
        }
    }
}

/// Quote one word for `sh`. Plain words are left as they are.
pub fn quote(word: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(word)).into_owned()
}

/// Settings for the per-change pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Branch changes are rebased onto.
    pub mainline: String,

    /// Project build/test command, run through `sh -c`.
    pub build_command: String,

    /// Timeout for each git step in seconds (0 = none).
    pub git_timeout_secs: u64,

    /// Timeout for the build step in seconds (0 = none).
    pub build_timeout_secs: u64,

    /// Directory sandboxes are created in (system temp dir when unset).
    pub sandbox_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mainline: "master".to_string(),
            build_command: "wercker build".to_string(),
            git_timeout_secs: 600,
            build_timeout_secs: 3600,
            sandbox_root: None,
        }
    }
}

impl PipelineConfig {
    /// Parent directory for new sandboxes.
    pub fn sandbox_parent(&self) -> PathBuf {
        self.sandbox_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Configuration for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Human-readable stage name.
    pub name: String,

    /// Shell command line.
    pub command: String,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

impl StageConfig {
    /// Create a stage from a builtin step for one change.
    pub fn from_builtin(stage: BuiltinStage, target: &FetchTarget, config: &PipelineConfig) -> Self {
        Self {
            name: stage.name().to_string(),
            command: stage.command(target, config),
            timeout_secs: stage.timeout_secs(config),
        }
    }

    /// Create a custom stage configuration.
    pub fn custom(name: impl Into<String>, command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout_secs,
        }
    }
}
