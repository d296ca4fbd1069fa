use std::time::{Duration, Instant};

use log::debug;
use sysinfo::{Pid, ProcessStatus, System};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of waiting on another process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited,
    TimedOut,
}

/// Whether `pid` names a live process.
///
/// Zombies count as exited: the process is gone, only its parent has not
/// reaped it yet.
#[must_use]
pub fn process_exists(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return false;
    }
    system.process(pid).is_some_and(|process| {
        !matches!(
            process.status(),
            ProcessStatus::Zombie | ProcessStatus::Dead
        )
    })
}

/// Block until `pid` no longer exists or `timeout` elapses.
///
/// A timeout too large to represent as a deadline waits without bound.
#[must_use]
pub fn wait_for_exit(pid: u32, timeout: Duration) -> WaitOutcome {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if !process_exists(pid) {
            return WaitOutcome::Exited;
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!("Process {pid} still running after {timeout:?}");
                    return WaitOutcome::TimedOut;
                }
                POLL_INTERVAL.min(deadline - now)
            }
            None => POLL_INTERVAL,
        };
        std::thread::sleep(pause);
    }
}
