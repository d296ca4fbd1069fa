use std::fmt;

use crate::error::{InstallError, OperationError};
use crate::script::Operation;

/// Where an install run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    WaitingForProcessExit,
    ElevationCheck,
    Executing,
    Finished,
    Failed,
}

impl Phase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::WaitingForProcessExit => "waiting for application to exit",
            Self::ElevationCheck => "checking privileges",
            Self::Executing => "installing",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Position of an operation within its script, 1-based.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub index: usize,
    pub total: usize,
    pub operation: &'a Operation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    /// A best-effort operation failed; the script carries on.
    Warning(OperationError),
    Failed(OperationError),
}

/// Receives progress from an [`UpdateInstaller`](crate::UpdateInstaller).
///
/// Methods are called from whichever thread runs the installer, so
/// implementations that render on another thread must marshal the data there
/// themselves. Every method has to return promptly; the installer waits for
/// each call before moving on.
pub trait InstallObserver: Send + Sync {
    fn phase_changed(&self, _phase: Phase) {}

    fn operation_started(&self, _step: Step<'_>) {}

    fn operation_finished(&self, _step: Step<'_>, _outcome: &OperationOutcome) {}

    /// The installer is about to block on an elevation prompt. A UI should
    /// stop drawing over the terminal until the run finishes.
    fn elevation_requested(&self) {}

    /// Called exactly once per run with the terminal result.
    fn finished(&self, result: &Result<(), InstallError>);
}
