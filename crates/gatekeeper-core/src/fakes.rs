//! In-memory collaborators for exercising the pipeline without a network,
//! a shell, or a wall clock (testing only).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_ci::{BuildResult, BuildRunner, FetchTarget, SandboxError, SandboxResult};

use crate::error::PasteError;
use crate::paste::PasteService;
use crate::schedule::{ShutdownTrigger, Sleeper};

/// Records uploads and hands out `https://paste.example.com/<n>` URLs.
#[derive(Debug, Default)]
pub struct MemoryPaste {
    uploads: Mutex<Vec<String>>,
    fail: bool,
}

impl MemoryPaste {
    pub fn new() -> Self {
        Self::default()
    }

    /// A paste service whose every upload fails with HTTP 500.
    pub fn failing() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl PasteService for MemoryPaste {
    async fn upload(&self, text: &str) -> Result<String, PasteError> {
        if self.fail {
            return Err(PasteError::Http {
                status: 500,
                body: "paste unavailable".to_string(),
            });
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(text.to_string());
        Ok(format!("https://paste.example.com/{}", uploads.len()))
    }
}

/// Build runner with canned outcomes keyed by git ref.
///
/// Unknown refs pass with a one-line transcript.
#[derive(Debug, Default)]
pub struct ScriptedBuildRunner {
    failing: Mutex<HashSet<String>>,
    erroring: Mutex<HashSet<String>>,
    elapsed: Mutex<HashMap<String, Duration>>,
    targets: Mutex<Vec<FetchTarget>>,
}

impl ScriptedBuildRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds of `git_ref` fail.
    pub fn fail_ref(&self, git_ref: &str) {
        self.failing.lock().unwrap().insert(git_ref.to_string());
    }

    /// Builds of `git_ref` return a sandbox cleanup error.
    pub fn error_ref(&self, git_ref: &str) {
        self.erroring.lock().unwrap().insert(git_ref.to_string());
    }

    pub fn set_elapsed(&self, git_ref: &str, elapsed: Duration) {
        self.elapsed
            .lock()
            .unwrap()
            .insert(git_ref.to_string(), elapsed);
    }

    /// Every target built, in order.
    pub fn targets(&self) -> Vec<FetchTarget> {
        self.targets.lock().unwrap().clone()
    }

    /// Refs of every target built, in order.
    pub fn built_refs(&self) -> Vec<String> {
        self.targets().into_iter().map(|t| t.git_ref).collect()
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuildRunner {
    async fn build(&self, target: &FetchTarget) -> SandboxResult<BuildResult> {
        self.targets.lock().unwrap().push(target.clone());

        if self.erroring.lock().unwrap().contains(&target.git_ref) {
            return Err(SandboxError::Cleanup {
                path: PathBuf::from("/tmp/gatekeeper-scripted"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }

        let success = !self.failing.lock().unwrap().contains(&target.git_ref);
        let elapsed = self
            .elapsed
            .lock()
            .unwrap()
            .get(&target.git_ref)
            .copied()
            .unwrap_or_default();
        let output = if success {
            format!("$ build {}\nok\n", target.git_ref)
        } else {
            format!("$ build {}\nbuild failed\n", target.git_ref)
        };

        Ok(BuildResult {
            success,
            output,
            elapsed,
            stages: Vec::new(),
        })
    }
}

/// Records requested delays without sleeping.
///
/// Fires the attached trigger after `stop_after` sleeps so a poll loop under
/// test terminates.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    stop: Option<(Arc<ShutdownTrigger>, usize)>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_after(trigger: Arc<ShutdownTrigger>, sleeps: usize) -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            stop: Some((trigger, sleeps)),
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut delays = self.delays.lock().unwrap();
            delays.push(duration);
            delays.len()
        };
        if let Some((trigger, limit)) = &self.stop {
            if count >= *limit {
                trigger.trigger();
            }
        }
    }
}
