use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use updater_core::{HelperRequest, Mode};

use crate::settings::UiPreference;

#[derive(Parser, Debug)]
#[command(name = "updater")]
#[command(about = "Applies a staged update package to an installed application", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Options {
    /// Directory of the installed application.
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Directory holding the staged update files.
    #[arg(long, value_name = "DIR")]
    pub package_dir: Option<PathBuf>,

    /// Update script; relative paths are looked up in the package directory.
    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Application process to wait for before installing.
    #[arg(long, value_name = "PID")]
    pub wait: Option<u32>,

    #[arg(long, value_enum, default_value_t = ModeArg::Main)]
    pub mode: ModeArg,

    /// Relaunch elevated even if the install directory looks writable.
    #[arg(long)]
    pub force_elevated: bool,

    /// Overrides the `ui` setting.
    #[arg(long, value_enum)]
    pub ui: Option<UiPreference>,

    #[arg(long, value_name = "FILE", hide = true)]
    pub result_file: Option<PathBuf>,

    #[arg(long)]
    pub version: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Main,
    Helper,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Main => Mode::Main,
            ModeArg::Helper => Mode::Helper,
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("--install-dir is required")]
    MissingInstallDir,
    #[error("--package-dir is required")]
    MissingPackageDir,
    #[error("cannot determine the current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Options after defaults and path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub mode: Mode,
    pub install_dir: PathBuf,
    pub package_dir: PathBuf,
    pub script: Option<PathBuf>,
    pub wait_pid: Option<u32>,
    pub force_elevated: bool,
    pub ui: Option<UiPreference>,
    pub result_file: Option<PathBuf>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required directory is missing or the current
    /// directory cannot be read.
    pub fn resolve(self) -> Result<Invocation, OptionsError> {
        let cwd = std::env::current_dir().map_err(OptionsError::CurrentDir)?;
        self.resolve_against(&cwd)
    }

    fn resolve_against(self, cwd: &Path) -> Result<Invocation, OptionsError> {
        let install_dir = cwd.join(self.install_dir.ok_or(OptionsError::MissingInstallDir)?);
        let package_dir = cwd.join(self.package_dir.ok_or(OptionsError::MissingPackageDir)?);
        let script = self.script.map(|script| package_dir.join(script));

        Ok(Invocation {
            mode: self.mode.into(),
            install_dir,
            package_dir,
            script,
            wait_pid: self.wait,
            force_elevated: self.force_elevated,
            ui: self.ui,
            result_file: self.result_file.map(|file| cwd.join(file)),
        })
    }
}

/// Arguments for relaunching this executable as an elevated helper.
///
/// The helper never waits on a pid and never shows its own progress.
pub fn helper_args(request: &HelperRequest) -> Vec<String> {
    let mut args = vec![
        "--mode".to_string(),
        "helper".to_string(),
        "--ui".to_string(),
        "none".to_string(),
        "--install-dir".to_string(),
        path_arg(&request.install_dir),
        "--package-dir".to_string(),
        path_arg(&request.package_dir),
    ];
    if let Some(script) = &request.script_path {
        args.push("--script".to_string());
        args.push(path_arg(script));
    }
    args.push("--result-file".to_string());
    args.push(path_arg(&request.result_file));
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use clap::Parser;
    use updater_core::{HelperRequest, Mode};

    use super::{Options, OptionsError, helper_args};
    use crate::settings::UiPreference;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(std::iter::once("updater").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    fn cwd() -> PathBuf {
        if cfg!(windows) {
            PathBuf::from(r"C:\work")
        } else {
            PathBuf::from("/work")
        }
    }

    #[test]
    fn relative_paths_resolve_against_cwd_and_package_dir() {
        let invocation = parse(&[
            "--install-dir",
            "app",
            "--package-dir",
            "staged",
            "--script",
            "update.script",
            "--wait",
            "4242",
        ])
        .resolve_against(&cwd())
        .expect("options should resolve");

        assert_eq!(invocation.mode, Mode::Main);
        assert_eq!(invocation.install_dir, cwd().join("app"));
        assert_eq!(invocation.package_dir, cwd().join("staged"));
        assert_eq!(
            invocation.script,
            Some(cwd().join("staged").join("update.script"))
        );
        assert_eq!(invocation.wait_pid, Some(4242));
        assert_eq!(invocation.ui, None);
    }

    #[test]
    fn absolute_script_path_is_kept() {
        let script = cwd().join("elsewhere").join("update.script");
        let invocation = parse(&[
            "--install-dir",
            "app",
            "--package-dir",
            "staged",
            "--script",
            script.to_str().expect("utf-8 path"),
        ])
        .resolve_against(&cwd())
        .expect("options should resolve");

        assert_eq!(invocation.script, Some(script));
    }

    #[test]
    fn missing_directories_are_reported() {
        assert!(matches!(
            parse(&["--package-dir", "staged"]).resolve_against(&cwd()),
            Err(OptionsError::MissingInstallDir)
        ));
        assert!(matches!(
            parse(&["--install-dir", "app"]).resolve_against(&cwd()),
            Err(OptionsError::MissingPackageDir)
        ));
    }

    #[test]
    fn version_flag_does_not_need_directories() {
        assert!(parse(&["--version"]).version);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Options::try_parse_from(["updater", "--mode", "sideways"]).is_err());
    }

    #[test]
    fn helper_args_round_trip_through_the_parser() {
        let root = cwd();
        let request = HelperRequest {
            install_dir: root.join("Program Files").join("App"),
            package_dir: root.join("staged"),
            script_path: Some(root.join("staged").join("update.script")),
            result_file: root.join("tmp").join("result.json"),
        };

        let args = helper_args(&request);
        let invocation = Options::try_parse_from(
            std::iter::once("updater".to_string()).chain(args.iter().cloned()),
        )
        .expect("helper arguments should parse")
        .resolve_against(Path::new("/unused"))
        .expect("helper arguments should resolve");

        assert_eq!(invocation.mode, Mode::Helper);
        assert_eq!(invocation.install_dir, request.install_dir);
        assert_eq!(invocation.package_dir, request.package_dir);
        assert_eq!(invocation.script, request.script_path);
        assert_eq!(invocation.result_file, Some(request.result_file));
        assert_eq!(invocation.wait_pid, None);
        assert_eq!(invocation.ui, Some(UiPreference::None));
        assert!(!invocation.force_elevated);
    }

    #[test]
    fn helper_args_omit_absent_script() {
        let request = HelperRequest {
            install_dir: cwd().join("app"),
            package_dir: cwd().join("staged"),
            script_path: None,
            result_file: cwd().join("result.json"),
        };

        assert!(!helper_args(&request).contains(&"--script".to_string()));
    }
}
