use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{InstallError, OperationError};

/// File name the main instance asks an elevated helper to report into.
pub const RESULT_FILE_NAME: &str = "result.json";

/// Outcome an elevated helper hands back across the process boundary.
///
/// A failure carries the helper's structured [`InstallError`] when it got far
/// enough to produce one; `message` alone covers failures before the installer
/// ran, such as a rejected script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HelperReport {
    Success,
    Failure {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<InstallError>,
    },
}

impl HelperReport {
    #[must_use]
    pub fn from_result(result: &Result<(), InstallError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(error) => Self::Failure {
                message: error.to_string(),
                error: Some(error.clone()),
            },
        }
    }

    #[must_use]
    pub fn failure(error: &impl std::fmt::Display) -> Self {
        Self::Failure {
            message: error.to_string(),
            error: None,
        }
    }

    /// Write the report as JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)
    }

    /// Read a report, treating an absent or garbled file as no report.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(report) => Some(report),
            Err(error) => {
                warn!("Ignoring unreadable helper report {}: {error}", path.display());
                None
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<(), InstallError> {
        match self {
            Self::Success => Ok(()),
            Self::Failure {
                error: Some(error), ..
            } => Err(error),
            Self::Failure {
                message,
                error: None,
            } => Err(InstallError::Helper(OperationError::unspecified(message))),
        }
    }
}
