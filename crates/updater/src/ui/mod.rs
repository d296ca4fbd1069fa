mod channel;
mod console;

use std::io::IsTerminal;

use log::{error, info};
use updater_core::{InstallError, InstallerConfig, Mode, ProcessControl, UpdateInstaller, UpdateScript};

use crate::settings::UiPreference;
use channel::ChannelObserver;
use console::ConsoleDialog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    /// Progress bar on the terminal; the installer runs on a worker thread.
    Console,
    /// No progress display; the installer runs on the calling thread.
    Headless,
}

impl Frontend {
    pub fn select(preference: UiPreference, mode: Mode) -> Self {
        Self::select_for(preference, mode, std::io::stderr().is_terminal())
    }

    fn select_for(preference: UiPreference, mode: Mode, interactive: bool) -> Self {
        match (mode, preference) {
            (Mode::Helper, _) | (Mode::Main, UiPreference::None) => Self::Headless,
            (Mode::Main, UiPreference::Console) => Self::Console,
            (Mode::Main, UiPreference::Auto) if interactive => Self::Console,
            (Mode::Main, UiPreference::Auto) => Self::Headless,
        }
    }
}

/// Run one install through `frontend`.
///
/// Returns `None` if the installer thread died without producing a result.
pub fn run(
    frontend: Frontend,
    config: InstallerConfig,
    script: Option<UpdateScript>,
    processes: &dyn ProcessControl,
) -> Option<Result<(), InstallError>> {
    match frontend {
        Frontend::Headless => Some(UpdateInstaller::new(config, script, processes).run()),
        Frontend::Console => run_with_console(config, script, processes),
    }
}

fn run_with_console(
    config: InstallerConfig,
    script: Option<UpdateScript>,
    processes: &dyn ProcessControl,
) -> Option<Result<(), InstallError>> {
    let (observer, events) = ChannelObserver::new();
    let observer = &observer;
    let mut installer = UpdateInstaller::new(config, script, processes);
    installer.set_observer(observer);

    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("installer".to_string())
            .spawn_scoped(scope, move || {
                let _session = observer.session();
                installer.run()
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(spawn_error) => {
                error!("Failed to start installer thread: {spawn_error}");
                return None;
            }
        };

        let mut dialog = ConsoleDialog::new();
        if dialog.exec(&events).is_none() {
            info!("Progress display ended without a result");
        }
        drop(dialog);

        match worker.join() {
            Ok(result) => Some(result),
            Err(_) => {
                error!("Installer thread panicked");
                None
            }
        }
    })
}
