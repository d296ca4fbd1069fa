use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{InstallError, OperationError};
use crate::exec::{self, Roots};
use crate::helper::{HelperReport, RESULT_FILE_NAME};
use crate::observer::{InstallObserver, OperationOutcome, Phase, Step};
use crate::process::{HelperExit, HelperRequest, ProcessControl, WaitOutcome};
use crate::script::UpdateScript;

pub const DEFAULT_PROCESS_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Started by the application; may relaunch itself elevated.
    #[default]
    Main,
    /// Relaunched with elevated rights by a main instance.
    Helper,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    pub mode: Mode,
    pub install_dir: PathBuf,
    pub package_dir: PathBuf,
    /// Application process to wait for before touching any file.
    pub wait_pid: Option<u32>,
    pub force_elevated: bool,
    pub wait_timeout: Duration,
    /// Helper mode only: where to leave a [`HelperReport`] for the main
    /// instance.
    pub report_file: Option<PathBuf>,
}

impl InstallerConfig {
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>, package_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Main,
            install_dir: install_dir.into(),
            package_dir: package_dir.into(),
            wait_pid: None,
            force_elevated: false,
            wait_timeout: DEFAULT_PROCESS_WAIT_TIMEOUT,
            report_file: None,
        }
    }
}

/// Drives one update from start to a terminal phase.
///
/// ```text
/// Idle -> WaitingForProcessExit -> ElevationCheck -> Executing -> Finished
///                                                  \-> Failed (from any non-terminal phase)
/// ```
///
/// An installer runs once. It owns its script for the whole run and borrows
/// the observer, which therefore outlives it.
pub struct UpdateInstaller<'a> {
    config: InstallerConfig,
    script: Option<UpdateScript>,
    processes: &'a dyn ProcessControl,
    observer: Option<&'a dyn InstallObserver>,
    phase: Phase,
    last_error: Option<InstallError>,
}

impl<'a> UpdateInstaller<'a> {
    /// `script` is `None` when no script was supplied, which is a valid no-op
    /// run distinct from an empty script.
    #[must_use]
    pub fn new(
        config: InstallerConfig,
        script: Option<UpdateScript>,
        processes: &'a dyn ProcessControl,
    ) -> Self {
        Self {
            config,
            script,
            processes,
            observer: None,
            phase: Phase::Idle,
            last_error: None,
        }
    }

    pub fn set_observer(&mut self, observer: &'a dyn InstallObserver) {
        self.observer = Some(observer);
    }

    #[must_use]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    #[must_use]
    pub fn script(&self) -> Option<&UpdateScript> {
        self.script.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&InstallError> {
        self.last_error.as_ref()
    }

    /// Run the update to completion.
    ///
    /// The observer's `finished` is called exactly once before this returns.
    ///
    /// # Errors
    /// Returns the error that moved the installer to [`Phase::Failed`], or
    /// [`InstallError::AlreadyStarted`] if the installer has already run.
    pub fn run(&mut self) -> Result<(), InstallError> {
        if self.phase != Phase::Idle {
            return Err(InstallError::AlreadyStarted);
        }

        let result = self.drive();
        match &result {
            Ok(()) => {
                info!("Update installed into {}", self.config.install_dir.display());
                self.enter(Phase::Finished);
            }
            Err(failure) => {
                error!("Update failed: {failure}");
                self.last_error = Some(failure.clone());
                self.enter(Phase::Failed);
            }
        }

        self.write_report(&result);
        if let Some(observer) = self.observer {
            observer.finished(&result);
        }
        result
    }

    fn drive(&mut self) -> Result<(), InstallError> {
        self.enter(Phase::WaitingForProcessExit);
        self.wait_for_application();

        self.enter(Phase::ElevationCheck);
        let elevate = self.needs_elevation();

        self.enter(Phase::Executing);
        if elevate {
            self.run_elevated_helper()
        } else {
            self.execute_script()
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!("Phase: {} -> {}", self.phase, phase);
        self.phase = phase;
        if let Some(observer) = self.observer {
            observer.phase_changed(phase);
        }
    }

    fn wait_for_application(&self) {
        let Some(pid) = self.config.wait_pid.filter(|pid| *pid != 0) else {
            debug!("No application process to wait for");
            return;
        };

        info!("Waiting for process {pid} to exit");
        match self.processes.wait_for_exit(pid, self.config.wait_timeout) {
            WaitOutcome::Exited => info!("Process {pid} has exited"),
            WaitOutcome::TimedOut => warn!(
                "Process {pid} still running after {:?}; continuing anyway",
                self.config.wait_timeout
            ),
        }
    }

    fn needs_elevation(&self) -> bool {
        match self.config.mode {
            Mode::Helper => {
                debug!("Running as elevated helper");
                false
            }
            Mode::Main if self.config.force_elevated => {
                info!("Elevation forced by caller");
                true
            }
            Mode::Main => match &self.script {
                Some(script) if !script.is_empty() => {
                    let sufficient = self
                        .processes
                        .has_sufficient_privileges(&self.config.install_dir, script);
                    if !sufficient {
                        info!(
                            "Insufficient privileges to update {}",
                            self.config.install_dir.display()
                        );
                    }
                    !sufficient
                }
                _ => false,
            },
        }
    }

    fn run_elevated_helper(&self) -> Result<(), InstallError> {
        let script_path = match &self.script {
            Some(script) => Some(script.path().map(Path::to_path_buf).ok_or_else(|| {
                InstallError::Helper(OperationError::unspecified(
                    "the update script was not read from a file and cannot be passed to an elevated helper",
                ))
            })?),
            None => None,
        };

        let result_dir = tempfile::Builder::new()
            .prefix("updater-helper-")
            .tempdir()
            .map_err(|error| {
                InstallError::Helper(OperationError::unspecified(format!(
                    "failed to create helper result directory: {error}"
                )))
            })?;

        let request = HelperRequest {
            install_dir: self.config.install_dir.clone(),
            package_dir: self.config.package_dir.clone(),
            script_path,
            result_file: result_dir.path().join(RESULT_FILE_NAME),
        };

        info!("Relaunching installer with elevated privileges");
        if let Some(observer) = self.observer {
            observer.elevation_requested();
        }
        let exit = self
            .processes
            .relaunch_elevated(&request)
            .map_err(|error| InstallError::elevation_denied(error.to_string()))?;

        match HelperReport::read(&request.result_file) {
            Some(report) => {
                info!("Elevated helper reported {report:?}");
                report.into_result()
            }
            None if exit.code == Some(0) => {
                warn!("Elevated helper exited cleanly without a report");
                Ok(())
            }
            None => Err(InstallError::Helper(OperationError::unspecified(format!(
                "elevated helper {} without reporting a result",
                describe_exit(exit)
            )))),
        }
    }

    fn execute_script(&self) -> Result<(), InstallError> {
        let Some(script) = &self.script else {
            info!("No update script supplied; nothing to install");
            return Ok(());
        };
        if script.is_empty() {
            info!("Update script contains no operations");
        }

        let roots = Roots {
            install_dir: &self.config.install_dir,
            package_dir: &self.config.package_dir,
        };
        let total = script.len();

        for (offset, operation) in script.operations().iter().enumerate() {
            let step = Step {
                index: offset + 1,
                total,
                operation,
            };
            info!("[{}/{total}] {operation}", step.index);
            if let Some(observer) = self.observer {
                observer.operation_started(step);
            }

            let outcome = match exec::execute(operation, roots) {
                Ok(()) => OperationOutcome::Succeeded,
                Err(failure) if operation.is_best_effort() => {
                    warn!(
                        "Best-effort step {} (line {}) failed: {failure}",
                        step.index,
                        operation.line()
                    );
                    OperationOutcome::Warning(failure)
                }
                Err(failure) => OperationOutcome::Failed(failure),
            };

            if let Some(observer) = self.observer {
                observer.operation_finished(step, &outcome);
            }

            if let OperationOutcome::Failed(source) = outcome {
                return Err(InstallError::Operation {
                    index: step.index,
                    operation: operation.to_string(),
                    source,
                });
            }
        }

        Ok(())
    }

    fn write_report(&self, result: &Result<(), InstallError>) {
        let Some(path) = &self.config.report_file else {
            return;
        };
        if let Err(error) = HelperReport::from_result(result).write(path) {
            warn!("Failed to write helper report {}: {error}", path.display());
        }
    }
}

fn describe_exit(exit: HelperExit) -> String {
    match exit.code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated".to_string(),
    }
}
