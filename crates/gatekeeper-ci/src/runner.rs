//! Single-stage execution inside a sandbox directory.

use crate::error::StageError;
use crate::stage::StageConfig;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Result of a stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code, `None` when killed by a signal or timed out.
    pub exit_code: Option<i32>,

    /// stdout and stderr, interleaved as written.
    pub output: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the stage was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs one stage through `sh -c` with stderr folded into stdout.
pub struct StageRunner;

impl StageRunner {
    /// Execute a single stage in `workdir` and return the result.
    ///
    /// The shell redirects its own stderr onto the stdout pipe before running
    /// the command, so the captured text keeps the order it was written in.
    /// The stage runs in its own process group, which is killed when the
    /// stage ends; on timeout the output read so far is kept.
    pub async fn execute_stage(
        config: &StageConfig,
        workdir: &Path,
    ) -> Result<StageResult, StageError> {
        let start = Instant::now();

        if config.command.trim().is_empty() {
            return Err(StageError::EmptyCommand {
                name: config.name.clone(),
            });
        }

        debug!(stage = %config.name, workdir = %workdir.display(), "spawning stage");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(format!("exec 2>&1\n{}", config.command))
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| StageError::Spawn {
            name: config.name.clone(),
            source,
        })?;
        let pid = child.id();
        let mut stdout = child.stdout.take();

        let mut captured = Vec::new();
        let waited = {
            let run = async {
                if let Some(out) = stdout.as_mut() {
                    out.read_to_end(&mut captured).await?;
                }
                child.wait().await
            };
            if config.timeout_secs > 0 {
                tokio::time::timeout(Duration::from_secs(config.timeout_secs), run)
                    .await
                    .ok()
            } else {
                Some(run.await)
            }
        };

        // Background jobs the command left behind go down with the stage.
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let output = String::from_utf8_lossy(&captured).into_owned();

        match waited {
            None => {
                warn!(
                    stage = %config.name,
                    timeout_secs = config.timeout_secs,
                    "stage timed out"
                );
                if let Err(e) = child.kill().await {
                    debug!(stage = %config.name, error = %e, "reaping timed out stage");
                }
                Ok(StageResult {
                    stage_name: config.name.clone(),
                    exit_code: None,
                    output,
                    duration_ms,
                    timed_out: true,
                })
            }
            Some(Err(source)) => Err(StageError::Wait {
                name: config.name.clone(),
                source,
            }),
            Some(Ok(status)) => Ok(StageResult {
                stage_name: config.name.clone(),
                exit_code: status.code(),
                output,
                duration_ms,
                timed_out: false,
            }),
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "failed to kill stage process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
