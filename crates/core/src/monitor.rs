//! FIFO mutual exclusion for multi-step async state transitions.
//!
//! A [`Monitor`] grants its critical section to callers strictly in the order
//! in which they called [`Monitor::enter`]. Unlike a plain mutex it exposes
//! [`Monitor::someone_is_waiting`], which lets the current holder detect
//! contention and give up early instead of doing work that a queued request
//! would immediately undo.
//!
//! Hand-over happens inside [`Monitor::leave`]: the head waiter is woken with
//! the critical section already assigned to it, so no third caller can slip in
//! between.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::trace;

#[derive(Debug, Default)]
struct MonitorState {
    /// Whether some caller currently owns the critical section.
    busy: bool,
    /// Callers suspended in `enter`, in arrival order.
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO async monitor. Cheap to clone; clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Suspend until every earlier caller has left, then own the critical
    /// section. Must be paired with exactly one [`leave`](Self::leave).
    ///
    /// Dropping the returned future while it is queued gives up the place in
    /// line; if the section was already handed over, it is passed on.
    pub async fn enter(&self) {
        let receiver = {
            let mut state = self.lock();
            if !state.busy {
                state.busy = true;
                trace!("monitor entered without waiting");
                return;
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            trace!(queued = state.waiters.len(), "monitor busy, queued");
            receiver
        };

        let mut pending = PendingEnter {
            monitor: self,
            receiver,
            granted: false,
        };
        // A closed channel means the monitor itself was dropped while we were
        // queued; there is nothing left to protect in that case.
        let _ = (&mut pending.receiver).await;
        pending.granted = true;
    }

    /// Release the critical section and hand it to the next waiter, if any.
    pub fn leave(&self) {
        let mut state = self.lock();
        while let Some(next) = state.waiters.pop_front() {
            // A waiter whose `enter` future was dropped cannot take over.
            if next.send(()).is_ok() {
                trace!(remaining = state.waiters.len(), "monitor handed over");
                return;
            }
        }
        state.busy = false;
        trace!("monitor released");
    }

    /// Enter and return a guard that leaves on drop.
    pub async fn lock_guard(&self) -> MonitorGuard<'_> {
        self.enter().await;
        MonitorGuard { monitor: self }
    }

    /// True when at least one caller is queued behind the current holder,
    /// i.e. the logical queue holds more than one entry.
    pub fn someone_is_waiting(&self) -> bool {
        let mut state = self.lock();
        state.waiters.retain(|waiter| !waiter.is_closed());
        !state.waiters.is_empty()
    }

    /// True while some caller owns the critical section.
    pub fn in_use(&self) -> bool {
        self.lock().busy
    }
}

/// A queued [`Monitor::enter`] call that has not returned yet.
struct PendingEnter<'a> {
    monitor: &'a Monitor,
    receiver: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for PendingEnter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.receiver.close();
        if self.receiver.try_recv().is_ok() {
            trace!("abandoned waiter passes the monitor on");
            self.monitor.leave();
        }
    }
}

/// RAII guard returned by [`Monitor::lock_guard`].
#[must_use = "the critical section ends when the guard is dropped"]
pub struct MonitorGuard<'a> {
    monitor: &'a Monitor,
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        self.monitor.leave();
    }
}
