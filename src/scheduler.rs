//! Render scheduling primitives
//!
//! Interactive edits produce far more transform updates than can be
//! rendered. Fast previews go through a [`FrameSlot`], where only the latest
//! submitted value survives until the next frame boundary. Full-fidelity
//! renders go through a [`Debouncer`], which restarts its timer on every
//! change and runs once things settle.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Last-write-wins slot drained once per frame
#[derive(Debug)]
pub struct FrameSlot<T> {
    pending: Mutex<Option<T>>,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for the next frame. Returns true if it replaced a
    /// value that was never rendered.
    pub fn submit(&self, value: T) -> bool {
        self.pending.lock().replace(value).is_some()
    }

    /// Take the latest value, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        self.pending.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

/// Cancellable trailing-edge debounce timer.
///
/// Each [`schedule`](Debouncer::schedule) cancels the previously scheduled
/// task while it is still waiting out its delay, so at most one action is
/// ever waiting. An action whose delay has elapsed is never interrupted:
/// superseding or cancelling only detaches it. Dropping the debouncer
/// cancels whatever is still waiting.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<Scheduled>>,
}

#[derive(Debug)]
struct Scheduled {
    handle: JoinHandle<()>,
    /// Set by whichever side gets there first: the task once its delay
    /// elapses, or a cancel while it is still waiting
    claimed: Arc<AtomicBool>,
}

impl Scheduled {
    /// Abort the task if it has not started its action yet
    fn cancel(self) -> bool {
        if self.claimed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.handle.abort();
        true
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the debounce delay unless superseded first.
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.delay, action);
    }

    /// Run `action` on the next scheduler turn, superseding any waiting one
    pub fn schedule_now<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(Duration::ZERO, action);
    }

    fn schedule_after<F, Fut>(&self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let claimed = Arc::new(AtomicBool::new(false));
        let task_claimed = claimed.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if task_claimed.swap(true, Ordering::SeqCst) {
                return;
            }
            action().await;
        });

        let previous = self.pending.lock().replace(Scheduled { handle, claimed });
        if let Some(previous) = previous {
            if previous.cancel() {
                debug!("Superseding pending debounced task");
            }
        }
    }

    /// Cancel the waiting action, if any. Returns true if one was stopped
    /// before it started; an action already running is left to finish.
    pub fn cancel(&self) -> bool {
        self.pending
            .lock()
            .take()
            .is_some_and(|scheduled| scheduled.cancel())
    }

    /// Whether an action is scheduled or still running
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|scheduled| !scheduled.handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(scheduled) = self.pending.get_mut().take() {
            scheduled.cancel();
        }
    }
}
