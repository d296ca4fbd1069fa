use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use updater_core::{
    ElevationError, HelperExit, HelperRequest, ProcessControl, UpdateScript, WaitOutcome,
    privileges,
};
use updater_platform::elevation::{self, ElevatedExit};

use crate::options::helper_args;

/// [`ProcessControl`] backed by the real operating system.
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> WaitOutcome {
        updater_platform::process::wait_for_exit(pid, timeout)
    }

    fn has_sufficient_privileges(&self, install_dir: &Path, script: &UpdateScript) -> bool {
        privileges::can_write_all(install_dir, script)
    }

    fn relaunch_elevated(&self, request: &HelperRequest) -> Result<HelperExit, ElevationError> {
        let executable = std::env::current_exe().map_err(|error| {
            ElevationError::Launch(format!("cannot locate the installer executable: {error}"))
        })?;
        let args = helper_args(request);
        debug!("Elevated helper: {} {}", executable.display(), args.join(" "));

        let exit = elevation::run_elevated(&executable, &args)
            .map_err(|error| ElevationError::Launch(error.to_string()))?;
        helper_exit(exit)
    }
}

fn helper_exit(exit: ElevatedExit) -> Result<HelperExit, ElevationError> {
    if exit.denied {
        info!("Elevation was refused");
        return Err(ElevationError::Refused);
    }
    if !exit.stderr.trim().is_empty() {
        if exit.success() {
            debug!("Elevated helper stderr: {}", exit.stderr.trim());
        } else {
            warn!("Elevated helper stderr: {}", exit.stderr.trim());
        }
    }
    Ok(HelperExit { code: exit.code })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use updater_core::{ElevationError, HelperExit, ProcessControl, UpdateScript, WaitOutcome};
    use updater_platform::elevation::ElevatedExit;

    use super::{SystemProcesses, helper_exit};

    #[test]
    fn refused_elevation_is_an_error() {
        let exit = ElevatedExit {
            code: Some(126),
            denied: true,
            stderr: String::new(),
        };

        assert_eq!(helper_exit(exit), Err(ElevationError::Refused));
    }

    #[test]
    fn helper_exit_code_is_passed_through() {
        let exit = ElevatedExit {
            code: Some(1),
            denied: false,
            stderr: "copy failed\n".to_string(),
        };

        assert_eq!(helper_exit(exit), Ok(HelperExit { code: Some(1) }));
    }

    #[test]
    fn waiting_on_ourselves_times_out() {
        let outcome = SystemProcesses.wait_for_exit(std::process::id(), Duration::from_millis(50));

        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn writable_install_dir_needs_no_elevation() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let script = UpdateScript::parse_str("COPY a -> bin/a\n").expect("script should parse");

        assert!(SystemProcesses.has_sufficient_privileges(temp.path(), &script));
    }
}
