use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Ownership {
    owner: Option<ThreadId>,
    holds: usize,
}

/// Re-entrant, timeout-capable lock with an explicit owner.
///
/// Unlike a guard-based mutex the lock is taken in one call and released in
/// another, possibly at the far end of a request. Only the owning thread can
/// release it; a release attempt from any other thread is refused.
#[derive(Debug, Default)]
pub struct ConversationLock {
    state: Mutex<Ownership>,
    released: Condvar,
}

/// Outcome of [`ConversationLock::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlock {
    /// Nobody held the lock.
    NotHeld,
    /// One hold was released; the lock is free now.
    Released,
    /// One hold was released; the owner still holds it re-entrantly.
    StillHeld,
    /// The caller does not own the lock.
    NotOwner,
}

impl ConversationLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// Returns false if another thread still holds it when the time is up.
    pub fn try_lock_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.holds = 1;
                    return true;
                }
                Some(owner) if owner == me => {
                    state.holds += 1;
                    return true;
                }
                Some(_) => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.released.wait_until(&mut state, deadline);
        }
    }

    /// Release one hold taken by the current thread.
    pub fn unlock(&self) -> Unlock {
        let me = thread::current().id();
        let mut state = self.state.lock();
        match state.owner {
            None => Unlock::NotHeld,
            Some(owner) if owner != me => Unlock::NotOwner,
            Some(_) => {
                state.holds -= 1;
                if state.holds == 0 {
                    state.owner = None;
                    self.released.notify_one();
                    Unlock::Released
                } else {
                    Unlock::StillHeld
                }
            }
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }
}
