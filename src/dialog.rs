//! Interruption dialog handshake.
//!
//! A dialog goes through exactly two states per request: requested, then
//! completed. Presentation runs in its own task; whatever way it ends (user
//! resumed, presenter error, presenter panic, failed dismissal) reaches the
//! coordinator as one completion for that [`DialogId`], and only the first
//! completion for an id counts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

use crate::error::{DismissalError, PresentationError};

/// Shows the blocking interruption prompt. Implemented by the host.
#[async_trait]
pub trait DialogPresenter: Send + Sync + 'static {
    /// Display the prompt and resolve once it has been closed.
    ///
    /// The prompt must not be dismissible by tapping outside it; its resume
    /// action should call [`ResumeHandle::resume`].
    async fn present(&self, resume: ResumeHandle) -> Result<(), PresentationError>;

    /// Close the prompt that is currently displayed.
    fn dismiss(&self) -> Result<(), DismissalError>;
}

/// Identifies one dialog request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialogId(u64);

#[derive(Debug)]
pub(crate) enum DialogEvent {
    /// Resume was requested, for a specific dialog or whichever is showing.
    Resume(Option<DialogId>),
    /// The presentation task ended.
    Finished(DialogId, Result<(), PresentationError>),
}

/// Given to the presenter so its resume action can reach the coordinator.
#[derive(Debug, Clone)]
pub struct ResumeHandle {
    dialog: DialogId,
    tx: mpsc::UnboundedSender<DialogEvent>,
}

impl ResumeHandle {
    pub fn dialog_id(&self) -> DialogId {
        self.dialog
    }

    /// Ask the coordinator to dismiss this dialog and resume monitoring.
    pub fn resume(&self) {
        if self.tx.send(DialogEvent::Resume(Some(self.dialog))).is_err() {
            trace!("Resume for {:?} dropped: monitor is gone", self.dialog);
        }
    }
}

#[derive(Debug)]
enum Handshake {
    Idle,
    Requested {
        id: DialogId,
        task: JoinHandle<()>,
        presentation: AbortHandle,
    },
}

/// Outcome of asking the presenter to close the current dialog.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Dismissal {
    /// No dialog has been requested.
    NoCurrentDialog,
    /// The presenter accepted; its `present` will finish on its own.
    Requested(DialogId),
    /// The presenter refused, including when it has not shown the prompt yet.
    Failed(DialogId, DismissalError),
}

/// Owns the presenter and the requested → completed handshake.
pub(crate) struct DialogController {
    presenter: Arc<dyn DialogPresenter>,
    handshake: Handshake,
    next_id: u64,
    tx: mpsc::UnboundedSender<DialogEvent>,
}

impl DialogController {
    pub(crate) fn new(
        presenter: Arc<dyn DialogPresenter>,
        tx: mpsc::UnboundedSender<DialogEvent>,
    ) -> Self {
        Self {
            presenter,
            handshake: Handshake::Idle,
            next_id: 0,
            tx,
        }
    }

    pub(crate) fn current(&self) -> Option<DialogId> {
        match self.handshake {
            Handshake::Idle => None,
            Handshake::Requested { id, .. } => Some(id),
        }
    }

    /// Start presenting. Returns `None` if a dialog is already requested.
    pub(crate) fn request(&mut self) -> Option<DialogId> {
        if let Some(id) = self.current() {
            debug!("Dialog {:?} already displayed, not requesting another", id);
            return None;
        }

        let id = DialogId(self.next_id);
        self.next_id += 1;

        let presenter = self.presenter.clone();
        let resume = ResumeHandle {
            dialog: id,
            tx: self.tx.clone(),
        };
        let done = self.tx.clone();

        // Separate task so a panicking presenter still reports completion.
        let presentation = tokio::spawn(async move { presenter.present(resume).await });
        let abort = presentation.abort_handle();
        let task = tokio::spawn(async move {
            let result = match presentation.await {
                Ok(result) => result,
                Err(e) => Err(PresentationError::Aborted(e.to_string())),
            };
            if done.send(DialogEvent::Finished(id, result)).is_err() {
                trace!("Completion of {:?} dropped: monitor is gone", id);
            }
        });

        debug!("Dialog {:?} requested", id);
        self.handshake = Handshake::Requested {
            id,
            task,
            presentation: abort,
        };
        Some(id)
    }

    /// Ask the presenter to close the current dialog.
    pub(crate) fn dismiss(&self) -> Dismissal {
        let Some(id) = self.current() else {
            return Dismissal::NoCurrentDialog;
        };
        match self.presenter.dismiss() {
            Ok(()) => {
                trace!("Dismissal of {:?} requested", id);
                Dismissal::Requested(id)
            }
            Err(e) => Dismissal::Failed(id, e),
        }
    }

    /// The single completion point. True only for the first completion of
    /// the current request. Whatever is left of the presentation is aborted.
    pub(crate) fn complete(&mut self, id: DialogId) -> bool {
        match &self.handshake {
            Handshake::Requested { id: current, .. } if *current == id => {
                self.abort_current();
                debug!("Dialog {:?} completed", id);
                true
            }
            _ => {
                trace!("Ignoring completion of stale dialog {:?}", id);
                false
            }
        }
    }

    /// Tear down any dialog in flight. Used on detach.
    pub(crate) fn shutdown(&mut self) {
        if let Some(id) = self.current() {
            if let Err(e) = self.presenter.dismiss() {
                warn!("Failed to dismiss dialog {:?} on detach: {}", id, e);
            }
            self.abort_current();
        }
    }

    fn abort_current(&mut self) {
        if let Handshake::Requested {
            task, presentation, ..
        } = std::mem::replace(&mut self.handshake, Handshake::Idle)
        {
            presentation.abort();
            task.abort();
        }
    }
}
