use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path must be relative")]
    Absolute,
    #[error("path escapes its root directory")]
    ParentEscape,
    #[error("path contains a NUL character")]
    NulCharacter,
}

/// Rejection of an update script. Always raised before anything on disk is
/// touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptParseError {
    #[error("failed to read update script {path} ({kind}): {message}")]
    Read {
        path: String,
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("line {line}: unknown operation '{kind}'")]
    UnknownOperation { line: usize, kind: String },

    #[error("line {line}: invalid path '{path}': {reason}")]
    InvalidPath {
        line: usize,
        path: String,
        reason: PathError,
    },

    #[error("line {line}: {operation} is missing its {field}")]
    MissingField {
        line: usize,
        operation: &'static str,
        field: &'static str,
    },

    #[error("line {line}: option '{option}' is not valid for {operation}")]
    InvalidOption {
        line: usize,
        operation: &'static str,
        option: String,
    },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl ScriptParseError {
    pub(crate) fn read(path: &Path, error: &std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }

    /// Manifest line the error refers to, if any.
    #[must_use]
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Read { .. } => None,
            Self::UnknownOperation { line, .. }
            | Self::InvalidPath { line, .. }
            | Self::MissingField { line, .. }
            | Self::InvalidOption { line, .. }
            | Self::Malformed { line, .. } => Some(*line),
        }
    }
}

/// Failure of a single operation while the script executes.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    #[error("{path} is missing from the package")]
    SourceMissing { path: String },

    #[error("cannot write {path} ({kind}): {message}")]
    DestinationUnwritable {
        path: String,
        #[serde(rename = "io_kind", with = "io_kind")]
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("command `{command}` failed: {details}")]
    CommandFailed { command: String, details: String },

    #[error("{details}")]
    Unspecified { details: String },
}

impl OperationError {
    pub(crate) fn unwritable(path: &Path, error: &std::io::Error) -> Self {
        Self::DestinationUnwritable {
            path: path.display().to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub(crate) fn command_failed(command: impl Into<String>, details: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            details: details.into(),
        }
    }

    pub(crate) fn unspecified(details: impl Into<String>) -> Self {
        Self::Unspecified {
            details: details.into(),
        }
    }
}

/// Terminal failure of an install run.
///
/// Serializable so an elevated helper can hand its exact failure back to the
/// main instance.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallError {
    #[error("step {index} ({operation}) failed: {source}")]
    Operation {
        index: usize,
        operation: String,
        #[source]
        source: OperationError,
    },

    #[error("elevated installer failed: {0}")]
    Helper(#[source] OperationError),

    #[error("administrator privileges were not granted: {details}")]
    ElevationDenied { details: String },

    #[error("the installer has already run")]
    AlreadyStarted,
}

impl InstallError {
    pub(crate) fn elevation_denied(details: impl Into<String>) -> Self {
        Self::ElevationDenied {
            details: details.into(),
        }
    }
}

/// `io::ErrorKind` as its variant name. Kinds this build does not know come
/// back as `Other`.
mod io_kind {
    use std::io::ErrorKind;

    use serde::{Deserialize, Deserializer, Serializer};

    const KNOWN: &[ErrorKind] = &[
        ErrorKind::NotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::AlreadyExists,
        ErrorKind::WouldBlock,
        ErrorKind::InvalidInput,
        ErrorKind::InvalidData,
        ErrorKind::TimedOut,
        ErrorKind::WriteZero,
        ErrorKind::Interrupted,
        ErrorKind::Unsupported,
        ErrorKind::UnexpectedEof,
        ErrorKind::OutOfMemory,
        ErrorKind::BrokenPipe,
        ErrorKind::IsADirectory,
        ErrorKind::NotADirectory,
        ErrorKind::DirectoryNotEmpty,
        ErrorKind::ReadOnlyFilesystem,
        ErrorKind::StorageFull,
        ErrorKind::ResourceBusy,
        ErrorKind::ExecutableFileBusy,
        ErrorKind::CrossesDevices,
        ErrorKind::InvalidFilename,
        ErrorKind::Other,
    ];

    fn name(kind: ErrorKind) -> String {
        format!("{kind:?}")
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(kind: &ErrorKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&name(*kind))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ErrorKind, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(KNOWN
            .iter()
            .copied()
            .find(|kind| name(*kind) == raw)
            .unwrap_or(ErrorKind::Other))
    }
}
