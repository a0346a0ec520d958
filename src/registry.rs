//! Process-wide "current instance" registry.
//!
//! Lets code outside the monitored scope report activity with
//! [`trigger_user_interaction`]. Attaching a monitor supersedes whatever was
//! registered; detaching clears the slot only if it still holds the
//! detaching monitor, so a quick remount is never clobbered by the teardown
//! of the instance it replaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::activity::{ActivitySignalAggregator, ActivitySource};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: LazyLock<Arc<InstanceRegistry>> = LazyLock::new(|| Arc::new(InstanceRegistry::new()));

/// Identity of one attached monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Registered {
    id: InstanceId,
    activity: ActivitySignalAggregator,
}

/// Holds at most one current monitor.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    current: Mutex<Option<Registered>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by [`trigger_user_interaction`].
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    /// Currently registered monitor, if any.
    pub fn current(&self) -> Option<InstanceId> {
        self.lock().as_ref().map(|r| r.id)
    }

    /// Make `id` the current instance, superseding any other.
    pub(crate) fn register(&self, id: InstanceId, activity: ActivitySignalAggregator) {
        let previous = self.lock().replace(Registered { id, activity });
        match previous {
            Some(prev) if prev.id != id => {
                debug!("Instance {:?} supersedes {:?}", id, prev.id);
            }
            _ => debug!("Instance {:?} registered", id),
        }
    }

    /// Clear the slot if it still holds `id`. Returns whether it did.
    pub(crate) fn clear_if(&self, id: InstanceId) -> bool {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|r| r.id == id) {
            *current = None;
            debug!("Instance {:?} unregistered", id);
            true
        } else {
            trace!("Instance {:?} no longer current, leaving registry alone", id);
            false
        }
    }

    /// Report activity to the current monitor. Does nothing if none is
    /// attached. Returns whether a monitor was there to receive it.
    pub fn trigger_user_interaction(&self) -> bool {
        let current = self.lock();
        match current.as_ref() {
            Some(registered) if registered.activity.is_closed() => {
                trace!("Instance {:?} has stopped listening", registered.id);
                false
            }
            Some(registered) => {
                registered.activity.notify_activity(ActivitySource::Trigger);
                true
            }
            None => {
                trace!("User interaction triggered with no monitor attached");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Registered>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Report user activity to whichever monitor is current in this process.
///
/// Safe to call at any time; a no-op when nothing is attached.
pub fn trigger_user_interaction() {
    GLOBAL.trigger_user_interaction();
}
