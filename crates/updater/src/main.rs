mod logging;
mod options;
mod settings;
mod single_instance;
mod system;
mod ui;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use updater_core::{HelperReport, InstallerConfig, Mode, ScriptParseError, UpdateScript};

use crate::options::{Invocation, Options};
use crate::settings::UpdaterSettings;
use crate::single_instance::{AcquireError, SingleInstance};
use crate::system::SystemProcesses;
use crate::ui::Frontend;

const EXIT_INSTALL_FAILED: u8 = 1;
const EXIT_INVALID_INVOCATION: u8 = 2;
const EXIT_ALREADY_RUNNING: u8 = 3;

fn main() -> ExitCode {
    let options = Options::parse();
    if options.version {
        println!("Update installer version {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let settings = UpdaterSettings::load();
    logging::init_logging(&settings);

    let invocation = match options.resolve() {
        Ok(invocation) => invocation,
        Err(error) => {
            error!("Invalid invocation: {error}");
            eprintln!("updater: {error}");
            return ExitCode::from(EXIT_INVALID_INVOCATION);
        }
    };
    log_startup(&invocation);

    let script = match load_script(invocation.script.as_deref()) {
        Ok(script) => script,
        Err(parse_error) => {
            error!("Rejected update script: {parse_error}");
            eprintln!("updater: {parse_error}");
            if invocation.mode == Mode::Helper
                && let Some(result_file) = &invocation.result_file
                && let Err(write_error) = HelperReport::failure(&parse_error).write(result_file)
            {
                warn!("Failed to write helper report {}: {write_error}", result_file.display());
            }
            return ExitCode::from(EXIT_INVALID_INVOCATION);
        }
    };

    let _instance = match invocation.mode {
        Mode::Main => match SingleInstance::acquire() {
            Ok(instance) => Some(instance),
            Err(AcquireError::AlreadyRunning) => {
                error!("Another installer instance is running");
                eprintln!("updater: {}", AcquireError::AlreadyRunning);
                return ExitCode::from(EXIT_ALREADY_RUNNING);
            }
            Err(lock_error) => {
                warn!("Continuing without the installer lock: {lock_error}");
                None
            }
        },
        Mode::Helper => None,
    };

    let frontend = Frontend::select(invocation.ui.unwrap_or(settings.ui), invocation.mode);
    let config = installer_config(&invocation, &settings);

    match ui::run(frontend, config, script, &SystemProcesses) {
        Some(Ok(())) => ExitCode::SUCCESS,
        Some(Err(install_error)) => {
            if frontend == Frontend::Headless && invocation.mode == Mode::Main {
                eprintln!("updater: {install_error}");
            }
            ExitCode::from(EXIT_INSTALL_FAILED)
        }
        None => {
            eprintln!("updater: the installation was aborted");
            ExitCode::from(EXIT_INSTALL_FAILED)
        }
    }
}

fn load_script(path: Option<&Path>) -> Result<Option<UpdateScript>, ScriptParseError> {
    path.map(UpdateScript::parse).transpose()
}

fn installer_config(invocation: &Invocation, settings: &UpdaterSettings) -> InstallerConfig {
    let mut config = InstallerConfig::new(&invocation.install_dir, &invocation.package_dir);
    config.mode = invocation.mode;
    config.wait_pid = invocation.wait_pid;
    config.force_elevated = invocation.force_elevated;
    config.wait_timeout = settings.process_wait_timeout();
    if invocation.mode == Mode::Helper {
        config.report_file.clone_from(&invocation.result_file);
    }
    config
}

fn log_startup(invocation: &Invocation) {
    info!(
        "Installer {} starting: mode {:?}, install dir {}, package dir {}, wait pid {}, script {}",
        env!("CARGO_PKG_VERSION"),
        invocation.mode,
        invocation.install_dir.display(),
        invocation.package_dir.display(),
        invocation
            .wait_pid
            .map_or_else(|| "none".to_string(), |pid| pid.to_string()),
        invocation
            .script
            .as_deref()
            .map_or_else(|| "none".to_string(), |path| path.display().to_string()),
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use updater_core::{Mode, ScriptParseError};

    use super::{installer_config, load_script};
    use crate::options::Invocation;
    use crate::settings::UpdaterSettings;

    fn invocation(mode: Mode) -> Invocation {
        Invocation {
            mode,
            install_dir: PathBuf::from("/opt/app"),
            package_dir: PathBuf::from("/tmp/staged"),
            script: None,
            wait_pid: Some(99),
            force_elevated: true,
            ui: None,
            result_file: Some(PathBuf::from("/tmp/result.json")),
        }
    }

    #[test]
    fn helper_config_reports_into_the_result_file() {
        let settings = UpdaterSettings {
            process_wait_timeout_secs: 7,
            ..UpdaterSettings::default()
        };

        let config = installer_config(&invocation(Mode::Helper), &settings);

        assert_eq!(config.mode, Mode::Helper);
        assert_eq!(config.report_file, Some(PathBuf::from("/tmp/result.json")));
        assert_eq!(config.wait_timeout, Duration::from_secs(7));
        assert_eq!(config.wait_pid, Some(99));
        assert!(config.force_elevated);
    }

    #[test]
    fn main_config_never_writes_a_report() {
        let config = installer_config(&invocation(Mode::Main), &UpdaterSettings::default());

        assert_eq!(config.report_file, None);
        assert_eq!(config.wait_timeout, Duration::from_secs(30));
    }

    #[test]
    fn absent_script_is_not_an_error() {
        assert_eq!(load_script(None), Ok(None));
    }

    #[test]
    fn unreadable_script_is_a_parse_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let result = load_script(Some(&temp.path().join("missing.script")));

        assert!(matches!(result, Err(ScriptParseError::Read { .. })));
    }
}
