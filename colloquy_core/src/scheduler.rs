//! Deferred termination contract.
//!
//! A [`TerminationHandle`] is shared between whoever scheduled a task and the
//! scheduler that eventually runs it. Its state only moves forward:
//! pending -> running -> finished, or pending -> cancelled. Cancelling after
//! the task has started always fails.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task once a delay has elapsed.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run after `delay`.
    ///
    /// Implementations must run the task through [`TerminationHandle::run`]
    /// on the returned handle so that cancellation is honoured, and should
    /// release whatever backs the timer through [`TerminationHandle::on_cancel`].
    fn schedule(&self, task: Task, delay: Duration) -> TerminationHandle;
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

struct Inner {
    state: AtomicU8,
    on_cancel: Mutex<Option<Task>>,
}

/// Cancellable handle to a scheduled task.
#[derive(Clone)]
pub struct TerminationHandle {
    inner: Arc<Inner>,
}

impl TerminationHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(PENDING),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Cancel the task if it has not started yet.
    ///
    /// Returns true if the task is (now or already) cancelled, false if it is
    /// running or has finished.
    pub fn cancel(&self) -> bool {
        match self.inner.state.compare_exchange(
            PENDING,
            CANCELLED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                let hook = self.inner.on_cancel.lock().take();
                if let Some(hook) = hook {
                    hook();
                }
                true
            }
            Err(CANCELLED) => true,
            Err(_) => false,
        }
    }

    /// Register `hook` to run once if the task is cancelled.
    ///
    /// Runs `hook` immediately when the handle is already cancelled. It is
    /// dropped unrun once the task starts.
    pub fn on_cancel(&self, hook: Task) {
        let mut slot = self.inner.on_cancel.lock();
        match self.inner.state.load(Ordering::Acquire) {
            PENDING => *slot = Some(hook),
            CANCELLED => {
                drop(slot);
                hook();
            }
            _ => {}
        }
    }

    /// Run `task` unless the handle was cancelled first.
    ///
    /// Returns whether the task ran.
    pub fn run(&self, task: Task) -> bool {
        if self
            .inner
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        drop(self.inner.on_cancel.lock().take());
        task();
        self.inner.state.store(FINISHED, Ordering::Release);
        true
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == PENDING
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FINISHED
    }
}

impl Default for TerminationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TerminationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.inner.state.load(Ordering::Acquire) {
            PENDING => "pending",
            RUNNING => "running",
            FINISHED => "finished",
            _ => "cancelled",
        };
        f.debug_struct("TerminationHandle")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
