//! Terminal front-end for the `inactivity-guard` binary.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use inactivity_guard::{
    CountdownPlacement, CountdownRenderer, DialogPresenter, DismissalError, LifecyclePhase,
    PresentationError, ResumeHandle, format_remaining,
};
use tokio::sync::Notify;
use tracing::debug;

/// One line of stdin, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free text. Counts as typing.
    Input(String),
    /// Drive the host lifecycle.
    Lifecycle(LifecyclePhase),
    /// Press the dialog's resume button.
    Resume,
    /// Print the monitor state.
    Status,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "resume" => return Self::Resume,
            "status" => return Self::Status,
            "quit" | "exit" => return Self::Quit,
            _ => {}
        }

        match trimmed.parse::<LifecyclePhase>() {
            Ok(phase) => Self::Lifecycle(phase),
            Err(_) => Self::Input(trimmed.to_string()),
        }
    }
}

/// Prints the prompt and blocks until dismissed.
#[derive(Debug, Default)]
pub struct TerminalDialog {
    shown: Mutex<Option<Arc<Notify>>>,
}

impl TerminalDialog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Notify>>> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DialogPresenter for TerminalDialog {
    async fn present(&self, resume: ResumeHandle) -> Result<(), PresentationError> {
        let closed = Arc::new(Notify::new());
        *self.lock() = Some(Arc::clone(&closed));

        println!();
        println!("  +------------------------------------------+");
        println!("  |  Are you still there?                    |");
        println!("  |  Type `resume` to continue.              |");
        println!("  +------------------------------------------+");
        debug!("Showing dialog {:?}", resume.dialog_id());

        closed.notified().await;
        Ok(())
    }

    fn dismiss(&self) -> Result<(), DismissalError> {
        let closed = self.lock().take().ok_or(DismissalError::NotDisplayed)?;
        closed.notify_one();
        println!("  Welcome back.");
        Ok(())
    }
}

/// Prints one line per countdown frame.
#[derive(Debug, Default)]
pub struct TerminalCountdown {
    placement: CountdownPlacement,
}

impl TerminalCountdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self, seconds_remaining: u64) -> String {
        format!(
            "[{}] {}",
            self.placement.as_str(),
            format_remaining(seconds_remaining)
        )
    }
}

impl CountdownRenderer for TerminalCountdown {
    fn place(&mut self, placement: CountdownPlacement) {
        self.placement = placement;
    }

    fn render(&mut self, seconds_remaining: u64) -> Result<(), PresentationError> {
        println!("{}", self.frame(seconds_remaining));
        Ok(())
    }
}
