//! At most one main installer per user.
//!
//! Elevated helpers never take the lock: their parent holds it for them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("another update is already being installed")]
    AlreadyRunning,
    #[error("failed to resolve installer paths: {0}")]
    Paths(#[from] updater_platform::AppPathsError),
    #[cfg_attr(windows, allow(dead_code))]
    #[error("installer lock {action} failed: {source}")]
    Lock {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[cfg(windows)]
    #[error("win32 call {api} failed with code {code}")]
    Win32 { api: &'static str, code: u32 },
}

/// Held for as long as this process is the one installing.
pub struct SingleInstance {
    _holder: imp::Holder,
}

impl SingleInstance {
    pub fn acquire() -> Result<Self, AcquireError> {
        let holder = imp::Holder::acquire()?;
        log::debug!("Installer lock acquired by process {}", std::process::id());
        Ok(Self { _holder: holder })
    }
}

#[cfg(windows)]
mod imp {
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE};
    use windows_sys::Win32::System::Threading::CreateMutexA;

    use super::AcquireError;

    const MUTEX_NAME: &[u8] = b"Global\\UpdateInstallerMutex\0";

    pub struct Holder {
        handle: HANDLE,
    }

    impl Holder {
        pub fn acquire() -> Result<Self, AcquireError> {
            // SAFETY: the name is a static NUL-terminated string and the
            // security attributes are null; the handle is checked before use.
            unsafe {
                let handle = CreateMutexA(ptr::null(), 1, MUTEX_NAME.as_ptr());
                if handle.is_null() {
                    return Err(AcquireError::Win32 {
                        api: "CreateMutexA",
                        code: GetLastError(),
                    });
                }
                if GetLastError() == ERROR_ALREADY_EXISTS {
                    CloseHandle(handle);
                    return Err(AcquireError::AlreadyRunning);
                }
                Ok(Self { handle })
            }
        }
    }

    impl Drop for Holder {
        fn drop(&mut self) {
            // SAFETY: the handle came from `CreateMutexA` and is owned here.
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use std::fs::{File, OpenOptions};
    use std::io::{ErrorKind, Seek, SeekFrom, Write};
    use std::path::Path;

    use fs2::FileExt;
    use updater_platform::AppPaths;

    use super::AcquireError;

    /// Exclusive `flock` on the lock file; released when the file closes.
    pub struct Holder {
        _file: File,
    }

    impl Holder {
        pub fn acquire() -> Result<Self, AcquireError> {
            let paths = AppPaths::new()?;
            paths.ensure_dirs().map_err(|source| AcquireError::Lock {
                action: "directory creation",
                source,
            })?;
            Self::acquire_at(&paths.instance_lock_file())
        }

        pub(crate) fn acquire_at(lock_path: &Path) -> Result<Self, AcquireError> {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(lock_path)
                .map_err(|source| AcquireError::Lock {
                    action: "open",
                    source,
                })?;

            if let Err(source) = file.try_lock_exclusive() {
                return Err(if source.kind() == ErrorKind::WouldBlock {
                    AcquireError::AlreadyRunning
                } else {
                    AcquireError::Lock {
                        action: "exclusive lock",
                        source,
                    }
                });
            }

            record_holder(&mut file).map_err(|source| AcquireError::Lock {
                action: "pid update",
                source,
            })?;
            Ok(Self { _file: file })
        }
    }

    /// Replace the lock file's contents with our pid, for whoever finds a
    /// stale-looking lock.
    fn record_holder(file: &mut File) -> std::io::Result<()> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())
    }

}
