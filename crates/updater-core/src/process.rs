use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::script::UpdateScript;

pub use updater_platform::process::WaitOutcome;

/// Everything an elevated helper needs to redo the run on our behalf.
///
/// The helper never waits on a pid: the main instance already did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperRequest {
    pub install_dir: PathBuf,
    pub package_dir: PathBuf,
    pub script_path: Option<PathBuf>,
    /// Where the helper must write its [`HelperReport`](crate::HelperReport).
    pub result_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperExit {
    pub code: Option<i32>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElevationError {
    #[error("the elevation request was refused")]
    Refused,
    #[error("failed to launch the elevated helper: {0}")]
    Launch(String),
}

/// Process and privilege primitives the installer depends on.
pub trait ProcessControl: Send + Sync {
    /// Block until `pid` is gone, for at most `timeout`.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> WaitOutcome;

    /// Whether this process can apply `script` to `install_dir` without
    /// elevation.
    fn has_sufficient_privileges(&self, install_dir: &Path, script: &UpdateScript) -> bool;

    /// Relaunch the installer elevated in helper mode and block until it exits.
    ///
    /// # Errors
    /// Returns an error if the user refuses elevation or the helper cannot be
    /// started.
    fn relaunch_elevated(&self, request: &HelperRequest) -> Result<HelperExit, ElevationError>;
}
