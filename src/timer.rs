//! Inactivity timer state machine.
//!
//! States:
//! - `Idle`: no handle scheduled
//! - `Running`: one handle due `timeout` after the last (re)start
//! - `Suspended`: handle cancelled for backgrounding, nothing scheduled
//!
//! A handle's fire is delivered on [`TimerFires`] tagged with its
//! generation. Aborting the sleeping task is best effort; the generation
//! check in [`InactivityTimer::fire`] is what rejects a fire that was
//! already queued when the handle was cancelled.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Suspended,
}

/// Identifies one scheduled handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerGeneration(u64);

/// Scheduled timeout. At most one exists per timer.
#[derive(Debug)]
struct TimerHandle {
    generation: TimerGeneration,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn cancel(self) {
        self.task.abort();
        trace!("Cancelled timer handle {:?}", self.generation);
    }
}

/// Receiving side for timer fires.
#[derive(Debug)]
pub struct TimerFires {
    rx: mpsc::UnboundedReceiver<TimerGeneration>,
}

impl TimerFires {
    /// Wait for the next fire, stale or not. Cancel-safe.
    pub async fn next(&mut self) -> Option<TimerGeneration> {
        self.rx.recv().await
    }
}

/// The single source of truth for "time since last activity".
#[derive(Debug)]
pub struct InactivityTimer {
    timeout: Duration,
    state: TimerState,
    next_generation: u64,
    handle: Option<TimerHandle>,
    fired_tx: mpsc::UnboundedSender<TimerGeneration>,
}

impl InactivityTimer {
    /// Create an idle timer. Scheduling requires a tokio runtime.
    pub fn new(timeout: Duration) -> (Self, TimerFires) {
        let (fired_tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                timeout,
                state: TimerState::Idle,
                next_generation: 0,
                handle: None,
                fired_tx,
            },
            TimerFires { rx },
        )
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Generation of the live handle, if any.
    pub fn generation(&self) -> Option<TimerGeneration> {
        self.handle.as_ref().map(|h| h.generation)
    }

    /// When the live handle fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.handle.as_ref().map(|h| h.deadline)
    }

    /// Schedule from `Idle`. Does nothing in any other state.
    pub fn start(&mut self) {
        if self.state == TimerState::Idle {
            self.schedule();
        } else {
            trace!("Timer start ignored in state {:?}", self.state);
        }
    }

    /// Cancel any pending handle and schedule a fresh one. Always ends `Running`.
    pub fn restart(&mut self) {
        self.schedule();
    }

    /// Cancel without rescheduling. Idempotent.
    pub fn suspend(&mut self) {
        self.cancel_handle();
        if self.state != TimerState::Suspended {
            debug!("Inactivity timer suspended");
            self.state = TimerState::Suspended;
        }
    }

    /// Cancel and return to `Idle`.
    pub fn cancel(&mut self) {
        self.cancel_handle();
        self.state = TimerState::Idle;
    }

    /// Handle a fire delivered by [`TimerFires`].
    ///
    /// Returns true exactly once per scheduled handle, and only if that
    /// handle is still the live one.
    pub fn fire(&mut self, generation: TimerGeneration) -> bool {
        match self.handle.as_ref() {
            Some(handle) if handle.generation == generation => {
                self.handle = None;
                self.state = TimerState::Idle;
                debug!("Inactivity timer fired ({:?})", generation);
                true
            }
            _ => {
                trace!("Ignoring stale timer fire {:?}", generation);
                false
            }
        }
    }

    fn schedule(&mut self) {
        self.cancel_handle();

        let generation = TimerGeneration(self.next_generation);
        self.next_generation += 1;

        let deadline = Instant::now() + self.timeout;
        let tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The timer may be gone by now; nothing to report to.
            let _ = tx.send(generation);
        });

        trace!("Scheduled timer handle {:?} in {:?}", generation, self.timeout);
        self.handle = Some(TimerHandle {
            generation,
            deadline,
            task,
        });
        self.state = TimerState::Running;
    }

    fn cancel_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.cancel_handle();
    }
}
