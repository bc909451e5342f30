use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use colloquy_core::{BeanStore, Conversation, TerminationHandle};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::lock::{ConversationLock, Unlock};

/// How an idle entry is going to expire.
#[derive(Debug)]
enum Expiry {
    /// Synchronous mode: last time the entry was released.
    Touched(DateTime<Utc>),
    /// Asynchronous mode: the scheduled termination, if one was installed.
    Deferred(Option<TerminationHandle>),
}

/// A tracked long-running conversation.
///
/// Wraps the conversation snapshot with the lock a request must hold while
/// using it, the bean store holding its state, and its expiry mechanism.
pub struct ManagedConversation {
    id: String,
    conversation: Mutex<Conversation>,
    bean_store: Arc<dyn BeanStore>,
    lock: ConversationLock,
    expiry: Mutex<Expiry>,
    destroyed: AtomicBool,
}

impl ManagedConversation {
    /// Track `conversation` under `id`, starting in synchronous mode.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        conversation: Conversation,
        bean_store: Arc<dyn BeanStore>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation: Mutex::new(conversation),
            bean_store,
            lock: ConversationLock::new(),
            expiry: Mutex::new(Expiry::Touched(now)),
            destroyed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn conversation(&self) -> Conversation {
        self.conversation.lock().clone()
    }

    /// Replace the snapshot, e.g. after a request changed the timeout.
    pub fn update_conversation(&self, conversation: Conversation) {
        *self.conversation.lock() = conversation;
    }

    #[must_use]
    pub fn bean_store(&self) -> &dyn BeanStore {
        self.bean_store.as_ref()
    }

    /// Try to check the conversation out for the current thread.
    pub fn try_lock(&self, timeout: Duration) -> bool {
        let acquired = self.lock.try_lock_for(timeout);
        if acquired {
            trace!("Conversation {} locked", self.id);
        } else {
            warn!(
                "Conversation {} unavailable after waiting {timeout:?}",
                self.id
            );
        }
        acquired
    }

    /// Take the lock only if nobody, including the current thread, holds it.
    ///
    /// Used by housekeeping that must not wait or nest inside a request.
    pub fn try_claim(&self) -> bool {
        !self.lock.is_locked() && self.lock.try_lock_for(Duration::ZERO)
    }

    /// Release one hold on the conversation.
    ///
    /// Returns true if the conversation is free afterwards. Never panics,
    /// even when called by a thread that does not own the lock.
    pub fn unlock(&self) -> bool {
        match self.lock.unlock() {
            Unlock::NotHeld => true,
            Unlock::Released => {
                trace!("Conversation {} unlocked", self.id);
                true
            }
            Unlock::StillHeld => {
                trace!("Conversation {} still held re-entrantly", self.id);
                false
            }
            Unlock::NotOwner => {
                warn!(
                    "Illegal attempt to unlock conversation {}: not owner",
                    self.id
                );
                false
            }
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Cancel the scheduled termination.
    ///
    /// Returns false only if the termination task has already started.
    pub fn cancel_deferred_termination(&self) -> bool {
        let expiry = self.expiry.lock();
        let Expiry::Deferred(Some(handle)) = &*expiry else {
            return true;
        };
        if handle.is_cancelled() {
            return true;
        }
        let cancelled = handle.cancel();
        if cancelled {
            trace!("Termination of conversation {} cancelled", self.id);
        } else {
            warn!(
                "Failed to cancel termination of conversation {}, it is already being destroyed",
                self.id
            );
        }
        cancelled
    }

    /// Switch to asynchronous expiry with a freshly scheduled termination.
    ///
    /// A previous handle that is still pending is cancelled.
    pub fn install_deferred_termination(&self, handle: TerminationHandle) {
        let mut expiry = self.expiry.lock();
        if let Expiry::Deferred(Some(previous)) = &*expiry {
            previous.cancel();
        }
        *expiry = Expiry::Deferred(Some(handle));
    }

    /// Switch to (or stay in) synchronous expiry, last used at `now`.
    ///
    /// A pending termination is cancelled.
    pub fn touch(&self, now: DateTime<Utc>) {
        let mut expiry = self.expiry.lock();
        if let Expiry::Deferred(Some(previous)) = &*expiry {
            previous.cancel();
        }
        *expiry = Expiry::Touched(now);
    }

    #[must_use]
    pub fn last_touched(&self) -> Option<DateTime<Utc>> {
        match &*self.expiry.lock() {
            Expiry::Touched(at) => Some(*at),
            Expiry::Deferred(_) => None,
        }
    }

    #[must_use]
    pub fn has_pending_termination(&self) -> bool {
        matches!(&*self.expiry.lock(), Expiry::Deferred(Some(handle)) if handle.is_pending())
    }

    /// Whether a synchronous-mode entry has been idle past its timeout.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(touched) = self.last_touched() else {
            return false;
        };
        let timeout_ms = i64::try_from(self.conversation.lock().timeout_ms()).unwrap_or(i64::MAX);
        let timeout = TimeDelta::try_milliseconds(timeout_ms).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(touched) > timeout
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tear down the conversation's persisted state.
    ///
    /// Safe to call more than once; only the first call clears the store.
    pub fn destroy(&self) -> anyhow::Result<()> {
        self.cancel_pending();
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Destroying state of conversation {}", self.id);
        self.bean_store.clear()
    }

    fn cancel_pending(&self) {
        if let Expiry::Deferred(Some(handle)) = &*self.expiry.lock() {
            if handle.is_pending() {
                handle.cancel();
            }
        }
    }
}

impl std::fmt::Debug for ManagedConversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConversation")
            .field("id", &self.id)
            .field("locked", &self.is_locked())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::Beans;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Default)]
    struct CountingStore {
        clears: AtomicUsize,
    }

    impl BeanStore for CountingStore {
        fn load(&self, _target: &mut Beans) -> anyhow::Result<()> {
            Ok(())
        }

        fn save(&self, _source: &Beans) -> anyhow::Result<()> {
            Ok(())
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn entry(timeout_ms: u64, now: DateTime<Utc>) -> (ManagedConversation, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        let entry = ManagedConversation::new("1", Conversation::new(timeout_ms), store.clone(), now);
        (entry, store)
    }

    #[test]
    fn test_expiry_is_strictly_after_timeout() {
        let now = Utc::now();
        let (entry, _) = entry(100, now);

        assert!(!entry.is_expired(now + TimeDelta::milliseconds(100)));
        assert!(entry.is_expired(now + TimeDelta::milliseconds(101)));

        entry.touch(now + TimeDelta::milliseconds(100));
        assert!(!entry.is_expired(now + TimeDelta::milliseconds(150)));
    }

    #[test]
    fn test_deferred_entry_never_expires_by_sweep() {
        let now = Utc::now();
        let (entry, _) = entry(100, now);
        entry.install_deferred_termination(TerminationHandle::new());

        assert!(!entry.is_expired(now + TimeDelta::hours(1)));
        assert!(entry.last_touched().is_none());
        assert!(entry.has_pending_termination());
    }

    #[test]
    fn test_cancel_deferred_termination_is_idempotent() {
        let (entry, _) = entry(100, Utc::now());
        assert!(entry.cancel_deferred_termination());

        entry.install_deferred_termination(TerminationHandle::new());
        assert!(entry.cancel_deferred_termination());
        assert!(entry.cancel_deferred_termination());
        assert!(!entry.has_pending_termination());
    }

    #[test]
    fn test_cancel_fails_once_termination_started() {
        let (entry, _) = entry(100, Utc::now());
        let handle = TerminationHandle::new();
        entry.install_deferred_termination(handle.clone());

        assert!(handle.run(Box::new(|| {})));
        assert!(!entry.cancel_deferred_termination());
    }

    #[test]
    fn test_touch_cancels_pending_termination() {
        let (entry, _) = entry(100, Utc::now());
        let handle = TerminationHandle::new();
        entry.install_deferred_termination(handle.clone());

        entry.touch(Utc::now());
        assert!(handle.is_cancelled());
        assert!(entry.last_touched().is_some());
    }

    #[test]
    fn test_destroy_twice_clears_once() {
        let (entry, store) = entry(100, Utc::now());
        let handle = TerminationHandle::new();
        entry.install_deferred_termination(handle.clone());

        assert!(entry.destroy().is_ok());
        assert!(entry.destroy().is_ok());

        assert!(entry.is_destroyed());
        assert!(handle.is_cancelled());
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unlock_from_other_thread_is_refused() {
        let (entry, _) = entry(100, Utc::now());
        let entry = Arc::new(entry);
        assert!(entry.unlock());
        assert!(entry.try_lock(Duration::ZERO));

        let other = entry.clone();
        let released = thread::spawn(move || other.unlock())
            .join()
            .unwrap_or(true);

        assert!(!released);
        assert!(entry.is_locked());
        assert!(entry.unlock());
    }

    #[test]
    fn test_try_claim_refuses_any_holder() {
        let (entry, _) = entry(100, Utc::now());
        let entry = Arc::new(entry);
        assert!(entry.try_claim());
        assert!(!entry.try_claim());
        assert!(entry.unlock());

        let other = entry.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = thread::spawn(move || {
            assert!(other.try_lock(Duration::ZERO));
            let _ = locked_tx.send(());
            let _ = release_rx.recv();
            other.unlock();
        });

        let _ = locked_rx.recv();
        assert!(!entry.try_claim());
        let _ = release_tx.send(());
        assert!(holder.join().is_ok());
        assert!(entry.try_claim());
    }
}
