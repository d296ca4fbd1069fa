use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use updater_core::{InstallError, InstallObserver, OperationOutcome, Phase, Step};

/// Installer progress, owned so it can cross to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Phase(Phase),
    Started {
        index: usize,
        total: usize,
        description: String,
    },
    Finished {
        index: usize,
        total: usize,
        description: String,
        outcome: OperationOutcome,
    },
    /// The installer is blocked on an elevation prompt.
    Elevating,
    Done(Result<(), InstallError>),
    /// The worker went away without reporting a result.
    Aborted,
}

/// Forwards observer callbacks from the worker thread into a channel.
pub struct ChannelObserver {
    sender: Sender<InstallEvent>,
    done: AtomicBool,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<InstallEvent>) {
        let (sender, receiver) = unbounded();
        (
            Self {
                sender,
                done: AtomicBool::new(false),
            },
            receiver,
        )
    }

    /// Guard for one installer run. Dropping it before `finished` was
    /// observed sends [`InstallEvent::Aborted`], so the receiving loop always
    /// terminates.
    pub fn session(&self) -> Session<'_> {
        Session { observer: self }
    }

    fn send(&self, event: InstallEvent) {
        // The dialog may already be gone; the installer carries on regardless.
        let _ = self.sender.send(event);
    }
}

impl InstallObserver for ChannelObserver {
    fn phase_changed(&self, phase: Phase) {
        self.send(InstallEvent::Phase(phase));
    }

    fn operation_started(&self, step: Step<'_>) {
        self.send(InstallEvent::Started {
            index: step.index,
            total: step.total,
            description: step.operation.to_string(),
        });
    }

    fn operation_finished(&self, step: Step<'_>, outcome: &OperationOutcome) {
        self.send(InstallEvent::Finished {
            index: step.index,
            total: step.total,
            description: step.operation.to_string(),
            outcome: outcome.clone(),
        });
    }

    fn elevation_requested(&self) {
        self.send(InstallEvent::Elevating);
    }

    fn finished(&self, result: &Result<(), InstallError>) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.send(InstallEvent::Done(result.clone()));
        }
    }
}

pub struct Session<'a> {
    observer: &'a ChannelObserver,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.observer.done.swap(true, Ordering::AcqRel) {
            self.observer.send(InstallEvent::Aborted);
        }
    }
}
