//! Inactivity coordinator.
//!
//! All monitor state lives in one task. Activity pulses, lifecycle
//! transitions, timer fires and dialog events are all messages to that task,
//! so nothing here needs a lock. Lifecycle transitions are polled ahead of
//! timer fires: a backgrounding that arrives alongside a queued fire
//! suspends the timer first, and the fire is then rejected as stale.
//!
//! [`InactivityGuard`] is the handle the host keeps; dropping it detaches.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::activity::{ActivityPulses, ActivitySignalAggregator, ActivitySource};
use crate::config::InactivityConfig;
use crate::countdown::{CountdownGeneration, CountdownPresenter, CountdownRenderer};
use crate::dialog::{DialogController, DialogEvent, DialogId, DialogPresenter, Dismissal};
use crate::error::{GuardError, PresentationError};
use crate::lifecycle::{LifecycleHost, LifecyclePhase, LifecycleStateTracker, LifecycleTransition};
use crate::registry::{InstanceId, InstanceRegistry};
use crate::timer::{InactivityTimer, TimerFires, TimerState};

/// Zero-argument notification hook.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Host-supplied callbacks and presentation collaborators.
#[derive(Default)]
pub struct InactivityHooks {
    on_inactive: Option<Callback>,
    on_paused_or_backgrounded: Option<Callback>,
    dialog: Option<Arc<dyn DialogPresenter>>,
    countdown: Option<Box<dyn CountdownRenderer>>,
}

impl InactivityHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the inactivity timeout elapses.
    #[must_use]
    pub fn on_inactive(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_inactive = Some(Arc::new(f));
        self
    }

    /// Called on every transition into a non-resumed lifecycle phase.
    #[must_use]
    pub fn on_paused_or_backgrounded(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_paused_or_backgrounded = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn dialog(mut self, presenter: Arc<dyn DialogPresenter>) -> Self {
        self.dialog = Some(presenter);
        self
    }

    #[must_use]
    pub fn countdown(mut self, renderer: impl CountdownRenderer) -> Self {
        self.countdown = Some(Box::new(renderer));
        self
    }
}

/// Snapshot of the coordinator, published after every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorState {
    pub attached: bool,
    pub dialog_visible: bool,
    pub lifecycle_phase: LifecyclePhase,
    pub countdown_generation: CountdownGeneration,
    pub timer: TimerState,
    /// When the live timer handle fires, if one is scheduled.
    pub deadline: Option<Instant>,
}

struct InactivityCoordinator {
    id: InstanceId,
    timeout: Duration,
    timer: InactivityTimer,
    tracker: LifecycleStateTracker,
    dialog: Option<DialogController>,
    countdown: Option<CountdownPresenter>,
    on_inactive: Option<Callback>,
    on_paused_or_backgrounded: Option<Callback>,
    state: CoordinatorState,
    state_tx: watch::Sender<CoordinatorState>,
}

impl InactivityCoordinator {
    fn start(&mut self) {
        self.timer.start();
        if !self.state.lifecycle_phase.is_resumed() {
            debug!(
                "Attached while {}, holding timer until resumed",
                self.state.lifecycle_phase
            );
            self.timer.suspend();
        }
        self.publish();
    }

    async fn run(
        mut self,
        mut pulses: ActivityPulses,
        mut fires: TimerFires,
        mut dialog_events: mpsc::UnboundedReceiver<DialogEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                transition = self.tracker.next_transition() => match transition {
                    Some(transition) => self.on_lifecycle_change(transition),
                    None => {
                        warn!("Lifecycle host went away, no longer observing lifecycle");
                        self.tracker.stop();
                    }
                },

                Some(generation) = fires.next() => {
                    if self.timer.fire(generation) {
                        self.on_timeout();
                    }
                }

                Some(event) = dialog_events.recv() => match event {
                    DialogEvent::Resume(target) => self.resume_from_dialog(target),
                    DialogEvent::Finished(id, result) => self.on_dialog_finished(id, result),
                },

                Some(source) = pulses.next() => self.notify_activity(source),
            }
        }

        pulses.close();
        self.shutdown();
    }

    fn notify_activity(&mut self, source: ActivitySource) {
        if !self.state.attached {
            trace!("Ignoring {} activity: detached", source);
            return;
        }
        if self.state.dialog_visible {
            trace!("Ignoring {} activity while dialog is displayed", source);
            return;
        }

        trace!("Activity from {}", source);
        self.restart_timer();
    }

    fn on_lifecycle_change(&mut self, transition: LifecycleTransition) {
        info!("Lifecycle changed: {} -> {}", transition.from, transition.to);
        self.state.lifecycle_phase = transition.to;
        if let Some(countdown) = &self.countdown {
            countdown.lifecycle_changed(transition.to);
        }

        if !transition.to.is_resumed() {
            self.timer.suspend();
            if let Some(callback) = &self.on_paused_or_backgrounded {
                invoke("paused/backgrounded", callback);
            }
            self.publish();
            return;
        }

        // Time spent away is untrusted: never resume a stale countdown.
        self.timer.cancel();
        if self.dialog.is_some() {
            if self.state.dialog_visible {
                debug!("Dialog already displayed on resume");
                self.publish();
            } else {
                info!("Returned to foreground, requesting re-acknowledgment");
                self.request_dialog_display();
            }
        } else {
            self.restart_timer();
        }
    }

    fn on_timeout(&mut self) {
        if self.state.dialog_visible {
            debug!("Timeout while dialog is displayed, ignoring");
            self.publish();
            return;
        }

        info!("No activity for {:?}, user is inactive", self.timeout);
        if let Some(callback) = &self.on_inactive {
            invoke("inactivity", callback);
        }

        if self.dialog.is_some() {
            self.request_dialog_display();
        } else {
            self.publish();
        }
    }

    fn request_dialog_display(&mut self) {
        let Some(dialog) = self.dialog.as_mut() else {
            return;
        };

        if dialog.request().is_some() {
            self.state.dialog_visible = true;
        }
        self.publish();
    }

    fn resume_from_dialog(&mut self, target: Option<DialogId>) {
        let Some(dialog) = self.dialog.as_ref() else {
            debug!("Resume requested but no dialog is configured");
            return;
        };

        let current = dialog.current();
        if target.is_some() && target != current {
            trace!("Ignoring resume for stale dialog {:?}", target);
            return;
        }

        match dialog.dismiss() {
            Dismissal::Requested(id) => debug!("Dismissing dialog {:?}", id),
            Dismissal::NoCurrentDialog => {
                warn!("Resume requested but no dialog is displayed");
            }
            Dismissal::Failed(id, e) => {
                warn!("Failed to dismiss dialog {:?}, forcing completion: {}", id, e);
                self.complete_dialog(id);
            }
        }
    }

    fn on_dialog_finished(&mut self, id: DialogId, result: Result<(), PresentationError>) {
        if let Err(e) = result {
            error!("{}", e);
        }
        self.complete_dialog(id);
    }

    /// Every way a dialog can end lands here.
    fn complete_dialog(&mut self, id: DialogId) {
        let Some(dialog) = self.dialog.as_mut() else {
            return;
        };
        if !dialog.complete(id) {
            return;
        }

        self.state.dialog_visible = false;
        info!("Dialog closed, resuming inactivity monitoring");
        self.restart_timer();
    }

    fn restart_timer(&mut self) {
        self.timer.restart();
        self.state.countdown_generation = self.state.countdown_generation.next();
        if let Some(countdown) = &self.countdown {
            countdown.reset(self.state.countdown_generation);
        }
        self.publish();
    }

    fn shutdown(&mut self) {
        if !self.state.attached {
            return;
        }

        self.state.attached = false;
        self.timer.cancel();
        self.tracker.stop();
        if let Some(dialog) = self.dialog.as_mut() {
            dialog.shutdown();
        }
        self.countdown = None;
        self.state.dialog_visible = false;
        self.publish();
        debug!("Inactivity monitor {:?} shut down", self.id);
    }

    fn publish(&mut self) {
        self.state.timer = self.timer.state();
        self.state.deadline = self.timer.deadline();
        self.state_tx.send_replace(self.state);
    }
}

/// Run a host callback, containing any panic so the monitor survives it.
fn invoke(name: &str, callback: &Callback) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
        error!("The {} callback panicked", name);
    }
}

/// Handle to an attached inactivity monitor.
///
/// Detaches on drop.
pub struct InactivityGuard {
    id: InstanceId,
    config: InactivityConfig,
    activity: ActivitySignalAggregator,
    dialog_tx: mpsc::UnboundedSender<DialogEvent>,
    state_rx: watch::Receiver<CoordinatorState>,
    shutdown: CancellationToken,
    registry: Arc<InstanceRegistry>,
}

impl InactivityGuard {
    /// Attach a monitor and make it the process-wide current instance.
    pub fn attach(
        config: InactivityConfig,
        hooks: InactivityHooks,
        lifecycle: &LifecycleHost,
    ) -> Result<Self, GuardError> {
        Self::attach_with_registry(config, hooks, lifecycle, InstanceRegistry::global())
    }

    /// Attach a monitor, registering it in `registry` instead of the global one.
    pub fn attach_with_registry(
        config: InactivityConfig,
        hooks: InactivityHooks,
        lifecycle: &LifecycleHost,
        registry: Arc<InstanceRegistry>,
    ) -> Result<Self, GuardError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| GuardError::NoRuntime)?;

        if config.dialog_enabled() && hooks.dialog.is_none() {
            return Err(GuardError::InvalidConfiguration(
                "dialog is enabled but no dialog presenter was supplied".to_string(),
            ));
        }
        if config.countdown_enabled() && hooks.countdown.is_none() {
            return Err(GuardError::InvalidConfiguration(
                "countdown is enabled but no countdown renderer was supplied".to_string(),
            ));
        }

        let id = InstanceId::next();
        let (activity, pulses) = ActivitySignalAggregator::new();
        let (timer, fires) = InactivityTimer::new(config.timeout());
        let tracker = LifecycleStateTracker::attach(lifecycle);
        let phase = tracker.phase();
        let (dialog_tx, dialog_rx) = mpsc::unbounded_channel();

        let dialog = hooks
            .dialog
            .filter(|_| config.dialog_enabled())
            .map(|presenter| DialogController::new(presenter, dialog_tx.clone()));
        let countdown = hooks
            .countdown
            .filter(|_| config.countdown_enabled())
            .map(|renderer| {
                CountdownPresenter::spawn(
                    config.timeout_seconds_ceil(),
                    config.countdown_placement(),
                    phase,
                    renderer,
                )
            });

        let state = CoordinatorState {
            attached: true,
            dialog_visible: false,
            lifecycle_phase: phase,
            countdown_generation: CountdownGeneration::default(),
            timer: TimerState::Idle,
            deadline: None,
        };
        let (state_tx, state_rx) = watch::channel(state);

        let mut coordinator = InactivityCoordinator {
            id,
            timeout: config.timeout(),
            timer,
            tracker,
            dialog,
            countdown,
            on_inactive: hooks.on_inactive,
            on_paused_or_backgrounded: hooks.on_paused_or_backgrounded,
            state,
            state_tx,
        };

        registry.register(id, activity.clone());
        coordinator.start();

        let shutdown = CancellationToken::new();
        runtime.spawn(coordinator.run(pulses, fires, dialog_rx, shutdown.clone()));

        info!(
            "Inactivity monitor {:?} attached (timeout={:?}, dialog={}, countdown={})",
            id,
            config.timeout(),
            config.dialog_enabled(),
            config.countdown_enabled()
        );

        Ok(Self {
            id,
            config,
            activity,
            dialog_tx,
            state_rx,
            shutdown,
            registry,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &InactivityConfig {
        &self.config
    }

    /// A signal source handle for pointer, key, scroll and text input.
    pub fn activity(&self) -> ActivitySignalAggregator {
        self.activity.clone()
    }

    pub fn notify_activity(&self, source: ActivitySource) {
        if self.is_attached() {
            self.activity.notify_activity(source);
        }
    }

    /// Dismiss the displayed dialog and resume monitoring.
    pub fn resume_from_dialog(&self) {
        if self.dialog_tx.send(DialogEvent::Resume(None)).is_err() {
            trace!("Resume dropped: monitor {:?} is gone", self.id);
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state_rx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state_rx.clone()
    }

    /// Time left before the user is considered inactive, if the timer is running.
    pub fn time_until_timeout(&self) -> Option<Duration> {
        self.state()
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_attached(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop monitoring. Safe to call any number of times.
    pub fn detach(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        self.shutdown.cancel();
        self.registry.clear_if(self.id);
        info!("Inactivity monitor {:?} detached", self.id);
    }

    /// Wait until the monitor task has finished tearing down.
    pub async fn wait_detached(&self) {
        let mut rx = self.state_rx.clone();
        // An error means the task is already gone, which is what we wait for.
        let _ = rx.wait_for(|state| !state.attached).await;
    }
}

impl Drop for InactivityGuard {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CountdownPlacement;
    use crate::dialog::testing::{Script, ScriptedDialog};
    use serial_test::serial;
    use std::sync::Mutex;

    const D: Duration = Duration::from_secs(10);

    #[derive(Clone, Default)]
    struct Calls {
        inactive: Arc<Mutex<Vec<Duration>>>,
        paused: Arc<Mutex<u32>>,
    }

    impl Calls {
        fn hooks(&self, start: Instant) -> InactivityHooks {
            let inactive = self.inactive.clone();
            let paused = self.paused.clone();
            InactivityHooks::new()
                .on_inactive(move || inactive.lock().unwrap().push(start.elapsed()))
                .on_paused_or_backgrounded(move || *paused.lock().unwrap() += 1)
        }

        fn inactive(&self) -> Vec<Duration> {
            self.inactive.lock().unwrap().clone()
        }

        fn paused(&self) -> u32 {
            *self.paused.lock().unwrap()
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    async fn sleep_until(start: Instant, at: Duration) {
        tokio::time::sleep_until(start + at).await;
    }

    fn attach(
        config: InactivityConfig,
        hooks: InactivityHooks,
        host: &LifecycleHost,
    ) -> InactivityGuard {
        InactivityGuard::attach_with_registry(config, hooks, host, Arc::new(InstanceRegistry::new()))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_at_deadline() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        sleep_until(start, Duration::from_millis(9_999)).await;
        assert!(calls.inactive().is_empty());
        assert_eq!(guard.state().timer, TimerState::Running);

        sleep_until(start, secs(60)).await;
        assert_eq!(calls.inactive(), vec![D]);
        assert_eq!(guard.state().timer, TimerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_pushes_deadline() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        sleep_until(start, secs(5)).await;
        guard.notify_activity(ActivitySource::Pointer);

        sleep_until(start, secs(14)).await;
        assert!(calls.inactive().is_empty());

        sleep_until(start, secs(40)).await;
        assert_eq!(calls.inactive(), vec![secs(15)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_activity_never_times_out() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);
        let activity = guard.activity();

        for i in 1..=20 {
            sleep_until(start, secs(i * 9)).await;
            if i % 2 == 0 {
                activity.key();
            } else {
                let mut input = activity.watch_text("");
                input.observe(&format!("draft {i}"));
            }
        }

        assert!(calls.inactive().is_empty());
        assert!(guard.time_until_timeout().unwrap() <= D);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_is_idempotent() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let registry = Arc::new(InstanceRegistry::new());
        let guard = InactivityGuard::attach_with_registry(
            InactivityConfig::new(D).unwrap(),
            calls.hooks(start),
            &host,
            registry.clone(),
        )
        .unwrap();
        assert_eq!(registry.current(), Some(guard.id()));
        assert_eq!(host.subscriber_count(), 1);

        guard.detach();
        guard.detach();
        guard.wait_detached().await;

        assert!(!guard.is_attached());
        assert!(registry.current().is_none());
        assert_eq!(host.subscriber_count(), 0);

        guard.notify_activity(ActivitySource::Key);
        host.notify(LifecyclePhase::Backgrounded);
        sleep_until(start, secs(60)).await;
        assert!(calls.inactive().is_empty());
        assert_eq!(calls.paused(), 0);
        drop(guard);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dialog_blocks_activity_until_resumed() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::WaitForDismiss);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        sleep_until(start, secs(10)).await;
        dialog.wait_presented(1).await;
        assert_eq!(calls.inactive(), vec![secs(10)]);
        assert!(guard.state().dialog_visible);
        let generation = guard.state().countdown_generation;

        sleep_until(start, secs(11)).await;
        for _ in 0..5 {
            guard.notify_activity(ActivitySource::Key);
            tokio::task::yield_now().await;
        }
        assert_eq!(guard.state().countdown_generation, generation);
        assert_eq!(guard.state().timer, TimerState::Idle);

        sleep_until(start, secs(12)).await;
        dialog.last_resume().resume();
        sleep_until(start, Duration::from_millis(12_001)).await;

        let state = guard.state();
        assert!(!state.dialog_visible);
        assert_eq!(state.timer, TimerState::Running);
        assert_eq!(state.countdown_generation, generation.next());
        assert_eq!(*dialog.dismissals.lock().unwrap(), 1);

        sleep_until(start, Duration::from_millis(21_999)).await;
        assert_eq!(calls.inactive().len(), 1);
        sleep_until(start, secs(22)).await;
        dialog.wait_presented(2).await;
        assert_eq!(calls.inactive(), vec![secs(10), secs(22)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_resume_dismisses_current_dialog() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::WaitForDismiss);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        sleep_until(start, secs(10)).await;
        dialog.wait_presented(1).await;

        guard.resume_from_dialog();
        sleep_until(start, secs(11)).await;
        assert!(!guard.state().dialog_visible);

        // Nothing displayed: logged, no state change.
        let before = guard.state();
        guard.resume_from_dialog();
        sleep_until(start, secs(12)).await;
        assert_eq!(guard.state().countdown_generation, before.countdown_generation);
        assert_eq!(*dialog.dismissals.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presentation_error_still_restarts() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::Fail);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        sleep_until(start, Duration::from_millis(10_001)).await;
        let state = guard.state();
        assert!(!state.dialog_visible);
        assert_eq!(state.timer, TimerState::Running);

        sleep_until(start, Duration::from_millis(20_001)).await;
        assert_eq!(calls.inactive(), vec![secs(10), secs(20)]);
        assert_eq!(dialog.presented_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_presenter_panic_still_restarts() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::Panic);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog),
            &host,
        );

        sleep_until(start, Duration::from_millis(10_001)).await;
        let state = guard.state();
        assert!(!state.dialog_visible);
        assert_eq!(state.timer, TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissal_failure_still_completes_once() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::with_failing_dismiss(Script::WaitForDismiss);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        sleep_until(start, secs(10)).await;
        dialog.wait_presented(1).await;
        let generation = guard.state().countdown_generation;

        let resume = dialog.last_resume();
        resume.resume();
        resume.resume();
        sleep_until(start, secs(11)).await;

        let state = guard.state();
        assert!(!state.dialog_visible);
        assert_eq!(state.countdown_generation, generation.next());
        assert_eq!(state.timer, TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_before_prompt_shown_still_completes() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::LateRegistration);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        host.notify(LifecyclePhase::Backgrounded);
        host.notify(LifecyclePhase::Resumed);
        guard.resume_from_dialog();

        sleep_until(start, secs(1)).await;
        let state = guard.state();
        assert!(!state.dialog_visible);
        assert_eq!(state.timer, TimerState::Running);
        assert_eq!(dialog.active(), 0);

        sleep_until(start, Duration::from_millis(11_001)).await;
        assert_eq!(calls.inactive(), vec![secs(10)]);
        assert!(guard.state().dialog_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_wins_over_queued_timeout() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        // The timer's fire and the backgrounding land on the same instant.
        sleep_until(start, D).await;
        host.notify(LifecyclePhase::Backgrounded);

        sleep_until(start, secs(30)).await;
        assert!(calls.inactive().is_empty());
        assert_eq!(calls.paused(), 1);
        assert_eq!(guard.state().timer, TimerState::Suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_suspends_and_resume_reprompts() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let dialog = ScriptedDialog::new(Script::WaitForDismiss);
        let guard = attach(
            InactivityConfig::new(D).unwrap().with_dialog(),
            calls.hooks(start).dialog(dialog.clone()),
            &host,
        );

        sleep_until(start, secs(2)).await;
        host.notify(LifecyclePhase::Inactive);
        sleep_until(start, secs(3)).await;
        assert_eq!(calls.paused(), 1);
        assert_eq!(guard.state().timer, TimerState::Suspended);
        assert_eq!(guard.state().lifecycle_phase, LifecyclePhase::Inactive);

        sleep_until(start, secs(20)).await;
        assert!(calls.inactive().is_empty());
        assert_eq!(dialog.presented_count(), 0);

        host.notify(LifecyclePhase::Resumed);
        dialog.wait_presented(1).await;
        let state = guard.state();
        assert!(state.dialog_visible);
        assert_eq!(state.lifecycle_phase, LifecyclePhase::Resumed);
        // Re-prompt bypasses the timeout path.
        assert!(calls.inactive().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_callback_once_per_transition() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let _guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        host.notify(LifecyclePhase::Inactive);
        host.notify(LifecyclePhase::Inactive);
        host.notify(LifecyclePhase::Backgrounded);
        sleep_until(start, secs(1)).await;
        assert_eq!(calls.paused(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_without_dialog_restarts_timer() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let _guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        sleep_until(start, secs(2)).await;
        host.notify(LifecyclePhase::Backgrounded);
        sleep_until(start, secs(20)).await;
        host.notify(LifecyclePhase::Resumed);

        sleep_until(start, secs(60)).await;
        assert_eq!(calls.inactive(), vec![secs(30)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_while_backgrounded_holds_timer() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::with_phase(LifecyclePhase::Backgrounded);
        let guard = attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host);

        assert_eq!(guard.state().timer, TimerState::Suspended);
        sleep_until(start, secs(30)).await;
        assert!(calls.inactive().is_empty());
        assert_eq!(calls.paused(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_resets_on_activity() {
        let start = Instant::now();
        let host = LifecycleHost::new();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = frames.clone();
        let guard = attach(
            InactivityConfig::new(D)
                .unwrap()
                .with_countdown(CountdownPlacement::BottomRight),
            InactivityHooks::new().countdown(move |s: u64| sink.lock().unwrap().push(s)),
            &host,
        );

        sleep_until(start, Duration::from_millis(1)).await;
        assert_eq!(frames.lock().unwrap().first(), Some(&10));

        sleep_until(start, Duration::from_millis(3_500)).await;
        guard.notify_activity(ActivitySource::Scroll);
        sleep_until(start, Duration::from_millis(3_501)).await;
        assert_eq!(frames.lock().unwrap().last(), Some(&10));
        assert_eq!(*frames.lock().unwrap(), vec![10, 9, 8, 7, 10]);
    }

    #[tokio::test]
    async fn test_missing_collaborators_rejected() {
        let host = LifecycleHost::new();
        let registry = Arc::new(InstanceRegistry::new());

        let err = InactivityGuard::attach_with_registry(
            InactivityConfig::new(D).unwrap().with_dialog(),
            InactivityHooks::new(),
            &host,
            registry.clone(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, GuardError::InvalidConfiguration(_)));

        let err = InactivityGuard::attach_with_registry(
            InactivityConfig::new(D)
                .unwrap()
                .with_countdown(CountdownPlacement::Center),
            InactivityHooks::new(),
            &host,
            registry.clone(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, GuardError::InvalidConfiguration(_)));
        assert!(registry.current().is_none());
        assert_eq!(host.subscriber_count(), 0);
    }

    #[test]
    fn test_attach_outside_runtime() {
        let host = LifecycleHost::new();
        let err = InactivityGuard::attach(InactivityConfig::new(D).unwrap(), InactivityHooks::new(), &host)
            .err()
            .unwrap();
        assert_eq!(err, GuardError::NoRuntime);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_is_contained() {
        let start = Instant::now();
        let host = LifecycleHost::new();
        let guard = attach(
            InactivityConfig::new(D).unwrap(),
            InactivityHooks::new().on_inactive(|| panic!("host bug")),
            &host,
        );

        sleep_until(start, Duration::from_millis(10_001)).await;
        guard.notify_activity(ActivitySource::Key);
        sleep_until(start, Duration::from_millis(10_002)).await;
        assert_eq!(guard.state().timer, TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remount_keeps_newer_instance_current() {
        let host = LifecycleHost::new();
        let registry = Arc::new(InstanceRegistry::new());
        let config = InactivityConfig::new(D).unwrap();

        let first = InactivityGuard::attach_with_registry(
            config.clone(),
            InactivityHooks::new(),
            &host,
            registry.clone(),
        )
        .unwrap();
        let second = InactivityGuard::attach_with_registry(
            config,
            InactivityHooks::new(),
            &host,
            registry.clone(),
        )
        .unwrap();

        drop(first);
        assert_eq!(registry.current(), Some(second.id()));
        second.detach();
        assert!(registry.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_global_trigger_resets_timer() {
        let start = Instant::now();
        let calls = Calls::default();
        let host = LifecycleHost::new();
        let guard =
            InactivityGuard::attach(InactivityConfig::new(D).unwrap(), calls.hooks(start), &host)
                .unwrap();

        sleep_until(start, secs(5)).await;
        crate::registry::trigger_user_interaction();

        sleep_until(start, secs(40)).await;
        assert_eq!(calls.inactive(), vec![secs(15)]);

        guard.detach();
        assert!(InstanceRegistry::global().current().is_none());
        crate::registry::trigger_user_interaction();
    }
}
