use std::time::Duration;

use colloquy_core::{Scheduler, Task, TerminationHandle};
use tokio::runtime::Handle;
use tracing::{error, trace};

/// Runs deferred terminations as timers on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    #[must_use]
    pub const fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime the caller is running on.
    ///
    /// Panics outside of a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> TerminationHandle {
        let handle = TerminationHandle::new();
        let timer = handle.clone();
        let sleeper = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !timer.is_pending() {
                trace!("Scheduled task cancelled before it was due");
                return;
            }
            // The task may block on collaborator I/O.
            if let Err(e) = tokio::task::spawn_blocking(move || timer.run(task)).await {
                error!("Scheduled task failed: {e}");
            }
        });
        let abort = sleeper.abort_handle();
        handle.on_cancel(Box::new(move || abort.abort()));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_task_runs_after_delay() {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let handle = scheduler.schedule(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
        );

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let handle = scheduler.schedule(
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(30),
        );
        assert!(handle.cancel());

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_cancelled_timers_are_released() {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
        let scheduler = TokioScheduler::new(runtime.handle().clone());
        let payload = Arc::new(());

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let held = payload.clone();
                scheduler.schedule(Box::new(move || drop(held)), Duration::from_secs(600))
            })
            .collect();
        assert_eq!(Arc::strong_count(&payload), 101);

        assert!(handles.iter().all(TerminationHandle::cancel));

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
