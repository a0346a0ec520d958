//! Application lifecycle (foreground/background) tracking.
//!
//! [`LifecycleHost`] is the host-side notifier: whatever owns the window or
//! process calls [`LifecycleHost::notify`] on every phase change. Monitors
//! observe it through a [`LifecycleStateTracker`], which holds a scoped
//! subscription that is released when the tracker stops or is dropped.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Host application execution state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// In the foreground and receiving input.
    #[default]
    Resumed,
    /// Visible but not receiving input (e.g. a system overlay is up).
    Inactive,
    /// Not visible.
    Backgrounded,
    /// The host view has been torn down.
    Detached,
}

impl LifecyclePhase {
    pub fn is_resumed(self) -> bool {
        self == Self::Resumed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resumed => "resumed",
            Self::Inactive => "inactive",
            Self::Backgrounded => "backgrounded",
            Self::Detached => "detached",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no lifecycle phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown lifecycle phase: {0}")]
pub struct UnknownPhase(String);

impl FromStr for LifecyclePhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resumed" | "fg" | "foreground" => Ok(Self::Resumed),
            "inactive" => Ok(Self::Inactive),
            "backgrounded" | "bg" | "background" | "paused" => Ok(Self::Backgrounded),
            "detached" => Ok(Self::Detached),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// A phase change as seen by one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTransition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
}

#[derive(Debug)]
struct HostState {
    current: LifecyclePhase,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<LifecyclePhase>>,
}

/// Host lifecycle notifier shared by everything in the process that cares
/// about foreground/background transitions.
#[derive(Debug, Clone)]
pub struct LifecycleHost {
    state: Arc<Mutex<HostState>>,
}

impl LifecycleHost {
    /// Create a host that starts in [`LifecyclePhase::Resumed`].
    pub fn new() -> Self {
        Self::with_phase(LifecyclePhase::Resumed)
    }

    pub fn with_phase(phase: LifecyclePhase) -> Self {
        Self {
            state: Arc::new(Mutex::new(HostState {
                current: phase,
                next_id: 0,
                subscribers: HashMap::new(),
            })),
        }
    }

    /// Last phase the host reported.
    pub fn current(&self) -> LifecyclePhase {
        lock(&self.state).current
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Report a phase change to every subscriber, in call order.
    pub fn notify(&self, phase: LifecyclePhase) {
        let mut state = lock(&self.state);
        debug!("Lifecycle phase reported: {} -> {}", state.current, phase);
        state.current = phase;
        // Receivers that went away without dropping their subscription are pruned here.
        state.subscribers.retain(|_, tx| tx.send(phase).is_ok());
    }

    /// Subscribe and snapshot the current phase atomically, so no
    /// notification can fall between the two.
    fn subscribe(&self) -> (LifecyclePhase, LifecycleSubscription) {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.insert(id, tx);
        trace!("Lifecycle subscription {} registered", id);

        (
            state.current,
            LifecycleSubscription {
                id,
                rx,
                host: Arc::downgrade(&self.state),
            },
        )
    }
}

impl Default for LifecycleHost {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(state: &Mutex<HostState>) -> MutexGuard<'_, HostState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration with a [`LifecycleHost`]; unregisters on drop.
#[derive(Debug)]
struct LifecycleSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<LifecyclePhase>,
    host: Weak<Mutex<HostState>>,
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        if let Some(state) = self.host.upgrade() {
            lock(&state).subscribers.remove(&self.id);
            trace!("Lifecycle subscription {} released", self.id);
        }
    }
}

/// Per-monitor view of the host lifecycle.
#[derive(Debug)]
pub struct LifecycleStateTracker {
    phase: LifecyclePhase,
    subscription: Option<LifecycleSubscription>,
}

impl LifecycleStateTracker {
    /// Register with the host and record its current phase.
    pub fn attach(host: &LifecycleHost) -> Self {
        let (phase, subscription) = host.subscribe();
        Self {
            phase,
            subscription: Some(subscription),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    #[cfg(test)]
    fn is_observing(&self) -> bool {
        self.subscription.is_some()
    }

    /// Wait for the next real phase change.
    ///
    /// Repeats of the recorded phase are skipped. Returns `None` once
    /// stopped or when the host is gone; pends forever after [`stop`].
    /// Cancel-safe.
    ///
    /// [`stop`]: Self::stop
    pub async fn next_transition(&mut self) -> Option<LifecycleTransition> {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return std::future::pending().await;
            };

            let phase = subscription.rx.recv().await?;
            if phase == self.phase {
                trace!("Ignoring repeated lifecycle phase {}", phase);
                continue;
            }

            let transition = LifecycleTransition {
                from: self.phase,
                to: phase,
            };
            self.phase = phase;
            return Some(transition);
        }
    }

    /// Stop observing the host. Idempotent.
    pub fn stop(&mut self) {
        if self.subscription.take().is_some() {
            debug!("Lifecycle observation stopped");
        }
    }
}
