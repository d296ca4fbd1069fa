use std::ops::ControlFlow;
use std::time::Duration;

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use updater_core::{InstallError, OperationOutcome};

use super::channel::InstallEvent;

const TICK_CHARS: &str = "<^>v ";

/// Terminal progress for one install run.
pub struct ConsoleDialog {
    bar: ProgressBar,
    warnings: usize,
}

impl ConsoleDialog {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(1))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {wide_msg}",
        ) {
            bar.set_style(style.tick_chars(TICK_CHARS).progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar, warnings: 0 }
    }

    /// Render events until the run finishes.
    ///
    /// Returns `None` if the worker aborted or the channel closed without a
    /// result.
    pub fn exec(&mut self, events: &Receiver<InstallEvent>) -> Option<Result<(), InstallError>> {
        for event in events {
            if let ControlFlow::Break(result) = self.apply(event) {
                return result;
            }
        }
        self.bar.abandon_with_message("installer stopped unexpectedly");
        None
    }

    fn apply(&mut self, event: InstallEvent) -> ControlFlow<Option<Result<(), InstallError>>> {
        match event {
            InstallEvent::Phase(phase) => {
                self.bar.set_message(phase.to_string());
                ControlFlow::Continue(())
            }
            InstallEvent::Started {
                index,
                total,
                description,
            } => {
                self.bar.set_length(total.max(1) as u64);
                self.bar.set_position(index.saturating_sub(1) as u64);
                self.bar.set_message(description);
                ControlFlow::Continue(())
            }
            InstallEvent::Finished {
                index,
                description,
                outcome,
                ..
            } => {
                self.bar.set_position(index as u64);
                match outcome {
                    OperationOutcome::Succeeded => {}
                    OperationOutcome::Warning(error) => {
                        self.warnings += 1;
                        self.bar
                            .println(format!("warning: step {index} ({description}): {error}"));
                    }
                    OperationOutcome::Failed(error) => {
                        self.bar
                            .println(format!("error: step {index} ({description}): {error}"));
                    }
                }
                ControlFlow::Continue(())
            }
            InstallEvent::Elevating => {
                // The prompt tool may need the terminal for a text agent.
                self.bar.disable_steady_tick();
                self.bar.println("Waiting for administrator approval...");
                self.bar.set_draw_target(ProgressDrawTarget::hidden());
                ControlFlow::Continue(())
            }
            InstallEvent::Done(result) => {
                if result.is_ok() {
                    self.bar.finish_and_clear();
                } else {
                    self.bar.abandon();
                }
                match &result {
                    Ok(()) if self.warnings > 0 => eprintln!(
                        "Update installed with {} warning(s)",
                        self.warnings
                    ),
                    Ok(()) => eprintln!("Update installed"),
                    Err(error) => eprintln!("Update failed: {error}"),
                }
                ControlFlow::Break(Some(result))
            }
            InstallEvent::Aborted => {
                self.bar.abandon_with_message("installation aborted");
                ControlFlow::Break(None)
            }
        }
    }
}

impl Drop for ConsoleDialog {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
