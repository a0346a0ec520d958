//! Error types for the inactivity guard.

use std::time::Duration;

use thiserror::Error;

/// Errors that prevent a monitor from being attached or driven.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Inactivity monitor must be attached from within a tokio runtime")]
    NoRuntime,
}

impl GuardError {
    pub(crate) fn timeout_out_of_range(timeout: Duration, max: Duration) -> Self {
        Self::InvalidConfiguration(format!(
            "timeout must be greater than zero and at most {max:?}, got {timeout:?}"
        ))
    }
}

/// A dialog or countdown collaborator failed while presenting.
///
/// Recoverable: the coordinator logs it and continues down the normal
/// completion path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresentationError {
    #[error("Dialog presentation failed: {0}")]
    Dialog(String),

    #[error("Countdown rendering failed: {0}")]
    Countdown(String),

    #[error("Presenter task ended abnormally: {0}")]
    Aborted(String),
}

/// Programmatic dismissal of the interruption dialog failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DismissalError {
    #[error("No dialog is currently displayed")]
    NotDisplayed,

    #[error("Dialog dismissal failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_out_of_range_message() {
        let err = GuardError::timeout_out_of_range(Duration::ZERO, Duration::from_secs(86_400));
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid configuration:"));
        assert!(msg.contains("0ns"));
        assert!(msg.contains("86400s"));
    }

    #[test]
    fn test_presentation_error_display() {
        let err = PresentationError::Dialog("window closed".to_string());
        assert_eq!(err.to_string(), "Dialog presentation failed: window closed");
    }
}
