use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use sha2::{Digest, Sha256};
use updater_platform::HideWindow;

use crate::error::OperationError;
use crate::path::RelativePath;
use crate::script::{Operation, OperationKind, Program};

const STAGING_PREFIX: &str = ".updater-";
const STDERR_TAIL_LINES: usize = 5;

/// Directories an operation is resolved against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Roots<'a> {
    pub install_dir: &'a Path,
    pub package_dir: &'a Path,
}

pub(crate) fn execute(operation: &Operation, roots: Roots<'_>) -> Result<(), OperationError> {
    match operation.kind() {
        OperationKind::CopyFile {
            source,
            destination,
            mode,
            sha256,
        } => copy_file(source, destination, *mode, sha256.as_deref(), roots),
        OperationKind::DeleteFile { destination } => delete_file(destination, roots),
        OperationKind::ExecuteCommand { program, args } => run_command(program, args, roots),
    }
}

fn copy_file(
    source: &RelativePath,
    destination: &RelativePath,
    mode: Option<u32>,
    expected_sha256: Option<&str>,
    roots: Roots<'_>,
) -> Result<(), OperationError> {
    let source_path = source.resolve(roots.package_dir);
    let destination_path = destination.resolve(roots.install_dir);

    let metadata = match fs::metadata(&source_path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return Err(OperationError::SourceMissing {
                path: format!("{source} (not a regular file)"),
            });
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(OperationError::SourceMissing {
                path: source.to_string(),
            });
        }
        Err(error) => {
            return Err(OperationError::unspecified(format!(
                "failed to inspect {}: {error}",
                source_path.display()
            )));
        }
    };

    if let Some(expected) = expected_sha256 {
        let actual = sha256_file(&source_path)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(OperationError::ChecksumMismatch {
                path: source.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        debug!("Checksum verified for {source}");
    }

    let parent = destination_path
        .parent()
        .unwrap_or(roots.install_dir)
        .to_path_buf();
    fs::create_dir_all(&parent).map_err(|error| OperationError::unwritable(&parent, &error))?;

    // Stage next to the destination so the final rename never crosses a
    // filesystem and a running binary is swapped instead of truncated.
    let mut staged = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(&parent)
        .map_err(|error| OperationError::unwritable(&parent, &error))?;
    let mut reader = File::open(&source_path).map_err(|error| {
        OperationError::unspecified(format!("failed to open {}: {error}", source_path.display()))
    })?;
    std::io::copy(&mut reader, staged.as_file_mut())
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|error| OperationError::unwritable(&destination_path, &error))?;

    fs::set_permissions(staged.path(), permissions_for(&metadata, mode))
        .map_err(|error| OperationError::unwritable(&destination_path, &error))?;

    make_replaceable(&destination_path)
        .map_err(|error| OperationError::unwritable(&destination_path, &error))?;
    staged
        .persist(&destination_path)
        .map_err(|error| OperationError::unwritable(&destination_path, &error.error))?;

    debug!(
        "Copied {} -> {}",
        source_path.display(),
        destination_path.display()
    );
    Ok(())
}

#[cfg(unix)]
fn permissions_for(source: &fs::Metadata, mode: Option<u32>) -> fs::Permissions {
    use std::os::unix::fs::PermissionsExt;

    match mode {
        Some(mode) => fs::Permissions::from_mode(mode),
        None => source.permissions(),
    }
}

#[cfg(not(unix))]
fn permissions_for(source: &fs::Metadata, mode: Option<u32>) -> fs::Permissions {
    if mode.is_some() {
        debug!("Ignoring unix file mode on this platform");
    }
    source.permissions()
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn make_replaceable(_destination: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Replacing a read-only file fails outside Unix, so a destination copied
/// from a read-only source on an earlier run is made writable first.
#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_replaceable(destination: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(destination) {
        Ok(metadata) if metadata.is_file() && metadata.permissions().readonly() => {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(false);
            fs::set_permissions(destination, permissions)
        }
        Ok(_) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn delete_file(destination: &RelativePath, roots: Roots<'_>) -> Result<(), OperationError> {
    let target = destination.resolve(roots.install_dir);

    let metadata = match fs::symlink_metadata(&target) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} already absent", target.display());
            return Ok(());
        }
        Err(error) => return Err(OperationError::unwritable(&target, &error)),
    };

    let removed = if metadata.is_dir() {
        fs::remove_dir_all(&target)
    } else {
        fs::remove_file(&target)
    };

    match removed {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(OperationError::unwritable(&target, &error)),
    }
}

fn run_command(
    program: &Program,
    args: &[String],
    roots: Roots<'_>,
) -> Result<(), OperationError> {
    let command_line = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");

    let program_path: PathBuf = match program {
        Program::Installed(path) => path.resolve(roots.install_dir),
        Program::OnPath(name) => which::which(name).map_err(|error| {
            OperationError::command_failed(&command_line, format!("{name} not found: {error}"))
        })?,
    };

    info!("Running `{command_line}` in {}", roots.install_dir.display());
    let output = Command::new(&program_path)
        .args(args)
        .current_dir(roots.install_dir)
        .env("UPDATER_INSTALL_DIR", roots.install_dir)
        .env("UPDATER_PACKAGE_DIR", roots.package_dir)
        .stdin(Stdio::null())
        .hide_window()
        .output()
        .map_err(|error| {
            OperationError::command_failed(&command_line, format!("failed to start: {error}"))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        debug!("`{command_line}` stdout:\n{}", stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        debug!("`{command_line}` stderr:\n{}", stderr.trim_end());
    }

    if output.status.success() {
        return Ok(());
    }

    let mut details = format!("exited with {}", output.status);
    let tail = stderr_tail(&stderr);
    if !tail.is_empty() {
        details.push_str(": ");
        details.push_str(&tail);
    }
    Err(OperationError::command_failed(command_line, details))
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

fn sha256_file(path: &Path) -> Result<String, OperationError> {
    let read_error = |error: std::io::Error| {
        OperationError::unspecified(format!("failed to hash {}: {error}", path.display()))
    };

    let mut file = File::open(path).map_err(read_error)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer).map_err(read_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
