//! Disposable working directories for a single build.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{SandboxError, SandboxResult};

const SANDBOX_PREFIX: &str = "gatekeeper-";

/// A fresh, empty directory owned by exactly one build.
///
/// Call [`Sandbox::destroy`] to remove it and observe cleanup errors. If the
/// sandbox is dropped instead (e.g. while unwinding), the directory is still
/// removed, best effort.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Create a sandbox under `parent`.
    pub fn create_in(parent: &Path) -> SandboxResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(SANDBOX_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| SandboxError::Create {
                parent: parent.to_path_buf(),
                source,
            })?;
        debug!(sandbox = %dir.path().display(), "sandbox created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the sandbox. A directory that is already gone is not an error.
    pub fn destroy(self) -> SandboxResult<()> {
        let path: PathBuf = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => {
                debug!(sandbox = %path.display(), "sandbox removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(sandbox = %path.display(), "sandbox already absent");
                Ok(())
            }
            Err(source) => {
                warn!(sandbox = %path.display(), error = %source, "sandbox removal failed");
                Err(SandboxError::Cleanup { path, source })
            }
        }
    }
}
