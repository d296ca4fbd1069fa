//! Update execution engine.
//!
//! This crate applies a staged update package to an installed application:
//! - Parsing and validating update scripts before anything is touched.
//! - The installer state machine: waiting for the application to exit,
//!   relaunching elevated when needed, executing operations fail-fast.
//! - The observer interface through which progress reaches a UI.

mod error;
mod exec;
mod helper;
mod installer;
mod observer;
mod path;
mod process;
mod script;

pub mod privileges;

/// Error taxonomy for parsing, executing and elevating.
pub use error::{InstallError, OperationError, PathError, ScriptParseError};
/// Outcome file exchanged with an elevated helper.
pub use helper::{HelperReport, RESULT_FILE_NAME};
/// The installer state machine and its configuration.
pub use installer::{DEFAULT_PROCESS_WAIT_TIMEOUT, InstallerConfig, Mode, UpdateInstaller};
/// Progress notifications.
pub use observer::{InstallObserver, OperationOutcome, Phase, Step};
pub use path::RelativePath;
/// Process and privilege capabilities consumed by the installer.
pub use process::{ElevationError, HelperExit, HelperRequest, ProcessControl, WaitOutcome};
/// Update scripts and their operations.
pub use script::{FailurePolicy, Operation, OperationKind, Program, UpdateScript};
