//! Relaunching a program with administrator rights.
//!
//! Each platform goes through its stock prompt: `pkexec` on Linux, an
//! AppleScript `do shell script ... with administrator privileges` on macOS and
//! `Start-Process -Verb RunAs` on Windows. The call blocks until the elevated
//! program exits.

use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::HideWindow;

/// Exit code the Windows shim reports when the UAC prompt is dismissed
/// (`ERROR_CANCELLED`).
#[cfg(any(target_os = "windows", test))]
const WINDOWS_CANCELLED: i32 = 1223;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevatedExit {
    /// Exit code of the elevated program, as far as the prompt tool forwards it.
    pub code: Option<i32>,
    /// The user refused the prompt or was not authorized.
    pub denied: bool,
    pub stderr: String,
}

impl ElevatedExit {
    #[must_use]
    pub fn success(&self) -> bool {
        !self.denied && self.code == Some(0)
    }
}

/// Run `program` with `args` through the platform elevation prompt and wait
/// for it to finish.
///
/// The terminal is passed through so a text authentication agent (pkexec
/// without a graphical polkit agent) can prompt on it.
///
/// # Errors
/// Returns an error when the prompt tool itself cannot be spawned.
pub fn run_elevated(program: &Path, args: &[String]) -> std::io::Result<ElevatedExit> {
    let mut command = elevated_command(program, args);
    info!("Requesting elevated relaunch of {}", program.display());
    let output = command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .hide_window()
        .output()?;

    let code = output.status.code();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let denied = is_denied(code, &stderr);
    debug!("Elevated process finished with code {code:?}, denied: {denied}");
    Ok(ElevatedExit {
        code,
        denied,
        stderr,
    })
}

#[cfg(all(unix, not(target_os = "macos")))]
fn elevated_command(program: &Path, args: &[String]) -> Command {
    let mut command = Command::new("pkexec");
    command.arg(program).args(args);
    command
}

#[cfg(target_os = "macos")]
fn elevated_command(program: &Path, args: &[String]) -> Command {
    let shell_line = std::iter::once(program.to_string_lossy().into_owned())
        .chain(args.iter().cloned())
        .map(|arg| shell_quote(&arg))
        .collect::<Vec<_>>()
        .join(" ");
    let script = format!(
        "do shell script \"{}\" with administrator privileges",
        applescript_escape(&shell_line)
    );
    let mut command = Command::new("osascript");
    command.args(["-e", &script]);
    command
}

#[cfg(target_os = "windows")]
fn elevated_command(program: &Path, args: &[String]) -> Command {
    let argument_list = args
        .iter()
        .map(|arg| windows_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let script = format!(
        "try {{ $p = Start-Process -FilePath {} -ArgumentList {} -Verb RunAs -Wait -PassThru; exit $p.ExitCode }} catch {{ exit {WINDOWS_CANCELLED} }}",
        powershell_literal(&program.to_string_lossy()),
        powershell_literal(&argument_list),
    );
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    command
}

#[cfg(all(unix, not(target_os = "macos")))]
fn is_denied(code: Option<i32>, _stderr: &str) -> bool {
    // pkexec: 126 when the dialog is dismissed, 127 when not authorized.
    matches!(code, Some(126 | 127))
}

#[cfg(target_os = "macos")]
fn is_denied(code: Option<i32>, stderr: &str) -> bool {
    code != Some(0) && (stderr.contains("User canceled") || stderr.contains("(-128)"))
}

#[cfg(target_os = "windows")]
fn is_denied(code: Option<i32>, _stderr: &str) -> bool {
    code == Some(WINDOWS_CANCELLED)
}

#[cfg(any(target_os = "macos", test))]
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(any(target_os = "macos", test))]
fn applescript_escape(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', "\\\"")
}

#[cfg(any(target_os = "windows", test))]
fn windows_quote(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\t', '"']) {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\\\""))
}

#[cfg(any(target_os = "windows", test))]
fn powershell_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::{
        ElevatedExit, WINDOWS_CANCELLED, applescript_escape, is_denied, powershell_literal,
        shell_quote, windows_quote,
    };

    #[test]
    fn shell_quote_wraps_and_escapes_single_quotes() {
        assert_eq!(shell_quote("/opt/My App"), "'/opt/My App'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn applescript_escape_handles_quotes_and_backslashes() {
        assert_eq!(applescript_escape(r#"a "b" \c"#), r#"a \"b\" \\c"#);
    }

    #[test]
    fn windows_quote_only_quotes_when_needed() {
        assert_eq!(windows_quote("--mode"), "--mode");
        assert_eq!(windows_quote(r"C:\Program Files\App"), r#""C:\Program Files\App""#);
        assert_eq!(windows_quote(""), "\"\"");
    }

    #[test]
    fn powershell_literal_doubles_single_quotes() {
        assert_eq!(powershell_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn elevated_exit_success_requires_zero_and_not_denied() {
        let ok = ElevatedExit {
            code: Some(0),
            denied: false,
            stderr: String::new(),
        };
        let failed = ElevatedExit {
            code: Some(1),
            ..ok.clone()
        };
        assert!(ok.success());
        assert!(!failed.success());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    #[test]
    fn pkexec_dismissal_codes_count_as_denied() {
        assert!(is_denied(Some(126), ""));
        assert!(is_denied(Some(127), ""));
        assert!(!is_denied(Some(1), ""));
        assert!(!is_denied(Some(0), ""));
    }

    #[cfg(target_os = "windows")]
    #[test]
    fn cancelled_uac_prompt_counts_as_denied() {
        assert!(is_denied(Some(WINDOWS_CANCELLED), ""));
        assert!(!is_denied(Some(1), ""));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn windows_cancel_code_matches_error_cancelled() {
        assert_eq!(WINDOWS_CANCELLED, 1223);
    }
}
