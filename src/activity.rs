//! Activity signal aggregation.
//!
//! Every input source funnels into one [`ActivitySignalAggregator`]; the
//! coordinator drains the matching [`ActivityPulses`] and restarts its timer
//! once per pulse.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;

/// Kind of user interaction that produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivitySource {
    /// Pointer down, move or hover.
    Pointer,
    Key,
    Scroll,
    /// Programmatic trigger from outside the monitored scope.
    Trigger,
    /// An edit in a watched text input.
    TextEdit,
}

impl ActivitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pointer => "pointer",
            Self::Key => "key",
            Self::Scroll => "scroll",
            Self::Trigger => "trigger",
            Self::TextEdit => "text_edit",
        }
    }
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloneable entry point for all activity signal sources.
///
/// Signals arriving while a pulse is still queued collapse into it.
#[derive(Debug, Clone)]
pub struct ActivitySignalAggregator {
    /// A pulse is queued and not yet drained.
    pending: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<ActivitySource>,
}

/// Receiving side of an [`ActivitySignalAggregator`].
#[derive(Debug)]
pub struct ActivityPulses {
    pending: Arc<AtomicBool>,
    rx: mpsc::UnboundedReceiver<ActivitySource>,
}

impl ActivitySignalAggregator {
    pub fn new() -> (Self, ActivityPulses) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        (
            Self {
                pending: pending.clone(),
                tx,
            },
            ActivityPulses { pending, rx },
        )
    }

    /// Report that the user did something.
    pub fn notify_activity(&self, source: ActivitySource) {
        if self.pending.swap(true, Ordering::AcqRel) {
            trace!("Collapsed {} activity into pending pulse", source);
            return;
        }

        if self.tx.send(source).is_err() {
            trace!("Dropped {} activity: monitor is gone", source);
        }
    }

    pub fn pointer(&self) {
        self.notify_activity(ActivitySource::Pointer);
    }

    pub fn key(&self) {
        self.notify_activity(ActivitySource::Key);
    }

    pub fn scroll(&self) {
        self.notify_activity(ActivitySource::Scroll);
    }

    pub fn trigger(&self) {
        self.notify_activity(ActivitySource::Trigger);
    }

    /// Whether the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Watch a text input; edits count as activity.
    pub fn watch_text(&self, initial: impl Into<String>) -> TextInputWatcher {
        TextInputWatcher {
            aggregator: self.clone(),
            last: initial.into(),
        }
    }
}

impl ActivityPulses {
    /// Wait for the next pulse. Returns `None` when every aggregator is gone.
    /// Cancel-safe.
    pub async fn next(&mut self) -> Option<ActivitySource> {
        let source = self.rx.recv().await?;
        self.pending.store(false, Ordering::Release);
        Some(source)
    }

    /// Stop accepting pulses; later signals are dropped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Reports [`ActivitySource::TextEdit`] whenever the observed text changes.
#[derive(Debug)]
pub struct TextInputWatcher {
    aggregator: ActivitySignalAggregator,
    last: String,
}

impl TextInputWatcher {
    /// Record the input's current text. Returns true if it was an edit.
    pub fn observe(&mut self, text: &str) -> bool {
        if self.last == text {
            return false;
        }
        text.clone_into(&mut self.last);
        self.aggregator.notify_activity(ActivitySource::TextEdit);
        true
    }

    pub fn text(&self) -> &str {
        &self.last
    }
}
