//! Per-mode expiry behaviour.
//!
//! The manager holds an [`ExpiryMode`]; the functions here apply that mode to
//! individual entries.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use colloquy_core::{Scheduler, Task};
use tracing::{debug, error, trace};

use crate::entry::ManagedConversation;
use crate::registry::ConversationRegistry;

/// How idle conversations are expired.
#[derive(Clone)]
pub enum ExpiryMode {
    /// Expired entries are swept at the start of each request.
    Synchronous,
    /// Each idle entry owns a termination task on this scheduler.
    Asynchronous(Arc<dyn Scheduler>),
}

impl ExpiryMode {
    #[must_use]
    pub const fn is_asynchronous(&self) -> bool {
        matches!(self, Self::Asynchronous(_))
    }
}

impl fmt::Debug for ExpiryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronous => f.write_str("Synchronous"),
            Self::Asynchronous(_) => f.write_str("Asynchronous"),
        }
    }
}

/// Put an entry that is being released back under the expiry of `mode`.
pub(crate) fn arm(
    mode: &ExpiryMode,
    registry: &Arc<ConversationRegistry>,
    entry: &Arc<ManagedConversation>,
    now: DateTime<Utc>,
) {
    match mode {
        ExpiryMode::Synchronous => entry.touch(now),
        ExpiryMode::Asynchronous(scheduler) => {
            schedule_termination(scheduler.as_ref(), registry, entry);
        }
    }
}

pub(crate) fn schedule_termination(
    scheduler: &dyn Scheduler,
    registry: &Arc<ConversationRegistry>,
    entry: &Arc<ManagedConversation>,
) {
    let timeout = Duration::from_millis(entry.conversation().timeout_ms());
    let task = termination_task(Arc::downgrade(registry), Arc::downgrade(entry));
    entry.install_deferred_termination(scheduler.schedule(task, timeout));
    trace!(
        "Termination of conversation {} scheduled in {timeout:?}",
        entry.id()
    );
}

fn termination_task(registry: Weak<ConversationRegistry>, entry: Weak<ManagedConversation>) -> Task {
    Box::new(move || {
        let (Some(registry), Some(entry)) = (registry.upgrade(), entry.upgrade()) else {
            return;
        };
        // Removed even if destruction fails, so no zombie entry is left behind.
        registry.remove_entry(&entry);
        destroy_logged(&entry, "conversation timed out");
        trace!("{} long-running conversations tracked", registry.len());
    })
}

/// Destroy every synchronous-mode entry idle past its timeout.
///
/// Entries currently checked out by a request are left alone; they are
/// touched again when that request ends. An expired entry is claimed before
/// it is removed, so no request can resume it while it is being destroyed.
pub(crate) fn sweep_expired(registry: &ConversationRegistry, now: DateTime<Utc>) -> usize {
    let mut destroyed = 0;
    for entry in registry.values_snapshot() {
        if !entry.is_expired(now) {
            continue;
        }
        if !entry.try_claim() {
            debug!("Conversation {} expired but in use, skipping", entry.id());
            continue;
        }
        // Its last holder may have touched it after the first check.
        if entry.is_expired(now) && registry.remove_entry(&entry) {
            destroy_logged(&entry, "conversation expired");
            destroyed += 1;
        }
        entry.unlock();
    }
    if destroyed > 0 {
        trace!("{} long-running conversations tracked", registry.len());
    }
    destroyed
}

/// Destroy an entry that has already left the registry, logging failures.
pub(crate) fn destroy_logged(entry: &ManagedConversation, reason: &str) -> bool {
    debug!("Destroying conversation {}: {reason}", entry.id());
    match entry.destroy() {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to destroy conversation {}: {e:#}", entry.id());
            false
        }
    }
}
