//! inactivity-guard - inactivity timeout and lifecycle re-prompt for interactive apps.
//!
//! Attach an [`InactivityGuard`] to a monitored scope. Feed it activity
//! through [`ActivitySignalAggregator`] (or [`trigger_user_interaction`] from
//! anywhere in the process) and lifecycle changes through a
//! [`LifecycleHost`]. After the configured timeout without activity it calls
//! the inactivity hook and, if configured, shows a blocking dialog. Returning
//! from the background always shows the dialog again.

pub mod activity;
pub mod config;
pub mod coordinator;
pub mod countdown;
pub mod dialog;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod timer;

pub use activity::{ActivitySignalAggregator, ActivitySource, TextInputWatcher};
pub use config::{CountdownPlacement, InactivityConfig, Settings};
pub use coordinator::{CoordinatorState, InactivityGuard, InactivityHooks};
pub use countdown::{CountdownGeneration, CountdownRenderer, format_remaining};
pub use dialog::{DialogId, DialogPresenter, ResumeHandle};
pub use error::{DismissalError, GuardError, PresentationError};
pub use lifecycle::{LifecycleHost, LifecyclePhase};
pub use registry::{InstanceId, InstanceRegistry, trigger_user_interaction};
pub use timer::TimerState;
