//! Live countdown presentation.
//!
//! The presenter runs in its own task with its own one-second tick. It only
//! ever hears about two things from the coordinator: a new generation (the
//! inactivity timer restarted) and lifecycle phase changes. Its ticks never
//! reach back into coordinator state; the count it shows is an estimate, the
//! inactivity timer stays authoritative.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::config::CountdownPlacement;
use crate::error::PresentationError;
use crate::lifecycle::LifecyclePhase;

const TICK: Duration = Duration::from_secs(1);

/// Draws the countdown. Implemented by the host.
pub trait CountdownRenderer: Send + 'static {
    /// Called once before the first frame.
    fn place(&mut self, _placement: CountdownPlacement) {}

    /// Draw the current number of whole seconds remaining.
    fn render(&mut self, seconds_remaining: u64) -> Result<(), PresentationError>;
}

impl<F> CountdownRenderer for F
where
    F: FnMut(u64) + Send + 'static,
{
    fn render(&mut self, seconds_remaining: u64) -> Result<(), PresentationError> {
        self(seconds_remaining);
        Ok(())
    }
}

/// Changes every time the inactivity timer restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CountdownGeneration(u64);

impl CountdownGeneration {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Presenter-owned count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownState {
    seconds_remaining: u64,
    paused: bool,
}

impl CountdownState {
    pub fn new(total_seconds: u64) -> Self {
        Self {
            seconds_remaining: total_seconds,
            paused: false,
        }
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.seconds_remaining
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the next tick would change the count.
    pub fn is_ticking(&self) -> bool {
        !self.paused && self.seconds_remaining > 0
    }

    pub fn reset(&mut self, total_seconds: u64) {
        self.seconds_remaining = total_seconds;
        self.paused = false;
    }

    /// Stop ticking, keeping the count.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Count down one second. Returns the new value, or `None` if paused or
    /// already at zero.
    pub fn tick(&mut self) -> Option<u64> {
        if !self.is_ticking() {
            return None;
        }
        self.seconds_remaining -= 1;
        Some(self.seconds_remaining)
    }
}

/// Render seconds as `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_remaining(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

#[derive(Debug, Clone, Copy)]
enum CountdownInput {
    Generation(CountdownGeneration),
    Lifecycle(LifecyclePhase),
}

/// Handle to a running countdown task. Dropping it stops the task.
#[derive(Debug)]
pub struct CountdownPresenter {
    tx: mpsc::UnboundedSender<CountdownInput>,
    task: JoinHandle<()>,
}

impl CountdownPresenter {
    /// Start the countdown task, showing `total_seconds` immediately.
    pub fn spawn(
        total_seconds: u64,
        placement: CountdownPlacement,
        phase: LifecyclePhase,
        mut renderer: Box<dyn CountdownRenderer>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        if std::panic::catch_unwind(AssertUnwindSafe(|| renderer.place(placement))).is_err() {
            warn!(
                "{}",
                PresentationError::Countdown("renderer panicked while placing".to_string())
            );
        }
        let task = tokio::spawn(run(rx, renderer, total_seconds, phase));
        debug!(
            "Countdown presenter started ({}s, {})",
            total_seconds,
            placement.as_str()
        );
        Self { tx, task }
    }

    /// The inactivity timer restarted.
    pub fn reset(&self, generation: CountdownGeneration) {
        self.send(CountdownInput::Generation(generation));
    }

    /// The host lifecycle phase changed.
    pub fn lifecycle_changed(&self, phase: LifecyclePhase) {
        self.send(CountdownInput::Lifecycle(phase));
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn send(&self, input: CountdownInput) {
        if self.tx.send(input).is_err() {
            trace!("Countdown presenter is gone, dropping {:?}", input);
        }
    }
}

impl Drop for CountdownPresenter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn new_ticker() -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn draw(renderer: &mut dyn CountdownRenderer, seconds: u64) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| renderer.render(seconds)))
        .unwrap_or_else(|_| {
            Err(PresentationError::Countdown(format!(
                "renderer panicked at {seconds}s"
            )))
        });
    if let Err(e) = result {
        warn!("Failed to render countdown: {}", e);
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<CountdownInput>,
    mut renderer: Box<dyn CountdownRenderer>,
    total_seconds: u64,
    phase: LifecyclePhase,
) {
    let mut state = CountdownState::new(total_seconds);
    let mut resumed = phase.is_resumed();
    let mut generation = CountdownGeneration::default();
    if !resumed {
        state.pause();
    }

    draw(renderer.as_mut(), state.seconds_remaining());
    let mut ticker = new_ticker();

    loop {
        tokio::select! {
            input = rx.recv() => {
                let Some(input) = input else {
                    break;
                };

                match input {
                    CountdownInput::Generation(next) => {
                        if next <= generation {
                            trace!("Ignoring stale countdown generation {:?}", next);
                            continue;
                        }
                        generation = next;
                        state.reset(total_seconds);
                        if !resumed {
                            state.pause();
                        }
                    }
                    CountdownInput::Lifecycle(phase) if phase.is_resumed() && !resumed => {
                        resumed = true;
                        state.reset(total_seconds);
                    }
                    CountdownInput::Lifecycle(phase) if !phase.is_resumed() && resumed => {
                        resumed = false;
                        state.pause();
                        trace!("Countdown paused at {}s", state.seconds_remaining());
                        continue;
                    }
                    CountdownInput::Lifecycle(_) => continue,
                }

                ticker.reset();
                draw(renderer.as_mut(), state.seconds_remaining());
            }

            _ = ticker.tick(), if state.is_ticking() => {
                if let Some(seconds) = state.tick() {
                    draw(renderer.as_mut(), seconds);
                }
            }
        }
    }

    trace!("Countdown presenter stopped");
}
