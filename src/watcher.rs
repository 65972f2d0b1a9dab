// Edge-triggered status watching
//
// Controllers are polled, so the same state arrives over and over. The watcher
// remembers the last state it saw and only reports transitions.

use futures::stream::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::machine::status::{MachineState, MachineStatus, StatusChange};

#[derive(Debug, Default)]
struct Remembered {
    state: MachineState,
    /// Bumped on every reset
    epoch: u64,
}

/// Remembers the most recent controller state and detects changes.
///
/// Clones share the remembered state, so a subscription's pump and the owner
/// of the subscription can both see (and reset) it. Each reset starts a new
/// epoch; changes are tagged with the epoch they were recorded under so a
/// consumer can drop those recorded before its last reset.
#[derive(Debug, Clone, Default)]
pub struct StatusWatcher {
    last: Arc<Mutex<Remembered>>,
}

impl StatusWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_state(&self) -> MachineState {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn epoch(&self) -> u64 {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).epoch
    }

    /// Forget the remembered state. The next reading is reported as a change
    /// even if it repeats the previous one.
    pub fn reset(&self) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        last.state = MachineState::Unknown;
        last.epoch += 1;
    }

    /// Record a reading; returns the change if it differs from the last one.
    pub fn record(&self, status: &MachineStatus) -> Option<StatusChange> {
        self.record_tagged(status).map(|(change, _)| change)
    }

    /// Like `record`, also returning the epoch the change belongs to
    pub fn record_tagged(&self, status: &MachineStatus) -> Option<(StatusChange, u64)> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.state == status.state {
            return None;
        }
        let change = StatusChange {
            previous: last.state,
            current: status.state,
        };
        last.state = status.state;
        Some((change, last.epoch))
    }

    /// Attach to a status feed. `on_change` runs on the pump task for every
    /// change, with its epoch, until the returned subscription is dropped or
    /// unsubscribed.
    pub fn observe<S, F>(&self, feed: S, mut on_change: F) -> Subscription
    where
        S: Stream<Item = MachineStatus> + Send + 'static,
        F: FnMut(StatusChange, u64) + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let watcher = self.clone();
        let pump_active = Arc::clone(&active);

        let handle = tokio::spawn(async move {
            let mut feed = Box::pin(feed);
            while let Some(status) = feed.next().await {
                if !pump_active.load(Ordering::SeqCst) {
                    break;
                }
                if let Some((change, epoch)) = watcher.record_tagged(&status) {
                    debug!(previous = %change.previous, current = %change.current, epoch, "Machine state changed");
                    on_change(change, epoch);
                }
            }
            if pump_active.load(Ordering::SeqCst) {
                warn!("Status feed ended while subscribed");
            }
        });

        Subscription {
            active,
            handle: Some(handle),
        }
    }
}

/// Handle on a running status feed pump. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop all future callbacks. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Status subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
