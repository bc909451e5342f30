//! Conversation manager for request-spanning conversations.
//!
//! The `ConversationManager` is owned by one session. Request handling calls
//! [`ConversationManager::setup_conversation`] when a request starts and
//! [`ConversationManager::teardown_conversation`] when it ends; the latter
//! must run even if the request failed, since it releases the conversation
//! lock taken by the former.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use colloquy_core::{
    BeanStoreProvider, Conversation, ConversationConfig, ConversationError, ConversationIds,
    ConversationRequest, Result, Scheduler, SessionHandle,
};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::entry::ManagedConversation;
use crate::expiry::{self, ExpiryMode};
use crate::registry::ConversationRegistry;

/// Resumes, releases and expires the long-running conversations of a session.
pub struct ConversationManager {
    session: SessionHandle,
    config: ConversationConfig,
    registry: Arc<ConversationRegistry>,
    mode: RwLock<ExpiryMode>,
    scheduler: Option<Arc<dyn Scheduler>>,
    bean_stores: Arc<dyn BeanStoreProvider>,
    next_id: AtomicU64,
    invalidated: AtomicBool,
}

impl ConversationManager {
    /// Create a manager in synchronous expiry mode.
    ///
    /// `config.asynchronous` takes effect once a scheduler is supplied with
    /// [`Self::with_scheduler`].
    #[must_use]
    pub fn new(
        session: SessionHandle,
        bean_stores: Arc<dyn BeanStoreProvider>,
        config: ConversationConfig,
    ) -> Self {
        info!("Creating conversation manager for {session}");
        Self {
            session,
            config,
            registry: Arc::new(ConversationRegistry::new()),
            mode: RwLock::new(ExpiryMode::Synchronous),
            scheduler: None,
            bean_stores,
            next_id: AtomicU64::new(0),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Supply the scheduler used for asynchronous expiry.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        if self.config.asynchronous {
            *self.mode.get_mut() = ExpiryMode::Asynchronous(scheduler.clone());
        }
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    #[must_use]
    pub const fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Start a request: a transient conversation with an active context.
    #[must_use]
    pub fn new_request(&self) -> ConversationRequest {
        let mut request = ConversationRequest::new(self.config.default_timeout_ms);
        request.context_mut().activate();
        request
    }

    /// Resume the conversation `cid` for `request`.
    ///
    /// With no (or an empty) id the request keeps its transient conversation.
    pub fn setup_conversation(
        &self,
        request: &mut ConversationRequest,
        cid: Option<&str>,
    ) -> Result<()> {
        let mode = self.mode.read().clone();
        if !mode.is_asynchronous() {
            expiry::sweep_expired(&self.registry, Utc::now());
        }

        let Some(cid) = cid.filter(|cid| !cid.is_empty()) else {
            trace!("No conversation to restore, continuing with a transient conversation");
            return Ok(());
        };

        let Some(entry) = self.registry.get(cid) else {
            warn!("Unable to restore conversation {cid}: id not known");
            return Err(ConversationError::Nonexistent(cid.to_string()));
        };

        if mode.is_asynchronous() && !entry.cancel_deferred_termination() {
            return Err(ConversationError::Busy(cid.to_string()));
        }

        if !entry.try_lock(self.config.concurrent_access_timeout()) {
            return Err(ConversationError::Busy(cid.to_string()));
        }

        // The previous holder may have re-armed a termination while we waited.
        if !entry.cancel_deferred_termination() {
            entry.unlock();
            return Err(ConversationError::Busy(cid.to_string()));
        }

        let still_tracked = self
            .registry
            .get(cid)
            .is_some_and(|current| Arc::ptr_eq(&current, &entry));
        if entry.is_destroyed() || !still_tracked {
            entry.unlock();
            warn!("Unable to restore conversation {cid}: destroyed while waiting");
            return Err(ConversationError::Nonexistent(cid.to_string()));
        }

        if let Err(e) = request.context_mut().load_from(entry.bean_store()) {
            request.context_mut().destroy();
            self.release(&entry);
            return Err(ConversationError::Storage(e));
        }

        let previous = request.conversation().to_string();
        request.conversation_mut().switch_to(&entry.conversation());
        debug!("Conversation switched from {previous} to {}", request.conversation());
        Ok(())
    }

    /// End `request`: persist or discard its conversation and release it.
    pub fn teardown_conversation(&self, request: &mut ConversationRequest) -> Result<()> {
        let conversation = request.conversation().clone();
        trace!("Cleaning up {conversation}");

        let result = match conversation.id() {
            None => {
                request.context_mut().destroy();
                if let Some(resumed) = conversation.resumed_id() {
                    self.discard(resumed, "conversation ended during request");
                }
                Ok(())
            }
            Some(cid) => {
                let persisted = self.persist(request, cid, &conversation);
                if let Some(resumed) = conversation.resumed_id().filter(|r| *r != cid) {
                    self.discard(resumed, "conversation replaced during request");
                }
                persisted
            }
        };

        request.context_mut().deactivate();
        result
    }

    fn persist(
        &self,
        request: &ConversationRequest,
        cid: &str,
        conversation: &Conversation,
    ) -> Result<()> {
        let mode = self.mode.read();
        let now = Utc::now();

        let saved = if let Some(entry) = self.registry.get(cid) {
            let saved = request.context().save_into(entry.bean_store());
            entry.update_conversation(conversation.clone());
            // Armed while still held, so nobody sees it released but stale.
            expiry::arm(&mode, &self.registry, &entry, now);
            entry.unlock();
            saved
        } else {
            let invalidated = self.invalidated.load(Ordering::Acquire);
            let store = self.bean_stores.of(&self.session, invalidated, cid);
            let saved = request.context().save_into(store.as_ref());
            let entry = Arc::new(ManagedConversation::new(
                cid,
                conversation.clone(),
                store,
                now,
            ));
            // Held until armed, so no other request can resume it first.
            let claimed = entry.try_claim();
            debug_assert!(claimed);
            self.registry.put(entry.clone());
            expiry::arm(&mode, &self.registry, &entry, now);
            entry.unlock();
            debug!("Conversation {cid} is now long-running");
            trace!("{} long-running conversations tracked", self.registry.len());
            saved
        };

        saved.map_err(ConversationError::Storage)
    }

    /// Re-arm the expiry of an entry the current request is giving up, then unlock it.
    fn release(&self, entry: &Arc<ManagedConversation>) {
        let mode = self.mode.read();
        expiry::arm(&mode, &self.registry, entry, Utc::now());
        entry.unlock();
    }

    fn discard(&self, cid: &str, reason: &str) {
        if let Some(entry) = self.registry.remove(cid) {
            entry.unlock();
            expiry::destroy_logged(&entry, reason);
            trace!("{} long-running conversations tracked", self.registry.len());
        }
    }

    /// Switch between synchronous and asynchronous expiry.
    ///
    /// Every tracked conversation's timeout window restarts at the switch.
    pub fn set_asynchronous(&self, asynchronous: bool) {
        let mut mode = self.mode.write();
        if mode.is_asynchronous() == asynchronous {
            return;
        }

        let entries = self.registry.values_snapshot();
        if !entries.is_empty() {
            warn!(
                "Switching expiry mode with {} tracked conversations, their timeouts restart now",
                entries.len()
            );
        }

        if asynchronous {
            let Some(scheduler) = self.scheduler.clone() else {
                warn!("No scheduler configured, staying in synchronous mode");
                return;
            };
            // Entries in use are armed when their request ends.
            for entry in &entries {
                if entry.try_claim() {
                    expiry::schedule_termination(scheduler.as_ref(), &self.registry, entry);
                    entry.unlock();
                }
            }
            *mode = ExpiryMode::Asynchronous(scheduler);
        } else {
            let now = Utc::now();
            for entry in &entries {
                entry.touch(now);
            }
            *mode = ExpiryMode::Synchronous;
        }
        info!("Conversation expiry mode is now {:?}", *mode);
    }

    #[must_use]
    pub fn is_asynchronous(&self) -> bool {
        self.mode.read().is_asynchronous()
    }

    /// Destroy every tracked conversation, e.g. when the session ends.
    ///
    /// Failures are logged and do not stop the remaining destructions.
    pub fn destroy_all_conversations(&self) {
        let entries = self.registry.values_snapshot();
        debug!(
            "Destroying all {} long-running conversations: session ended",
            entries.len()
        );
        for entry in &entries {
            if self.registry.remove_entry(entry) {
                expiry::destroy_logged(entry, "session ended");
            }
        }
        trace!("{} long-running conversations tracked", self.registry.len());
    }

    /// Mark the session invalidated and destroy all of its conversations.
    ///
    /// Bean stores handed out afterwards no longer write through.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
        self.destroy_all_conversations();
    }

    #[must_use]
    pub fn generate_conversation_id(&self) -> String {
        loop {
            let id = (self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
            if !self.registry.contains(&id) {
                return id;
            }
        }
    }

    /// Snapshot of every tracked conversation, keyed by id.
    #[must_use]
    pub fn get_conversations(&self) -> HashMap<String, Conversation> {
        self.registry
            .values_snapshot()
            .into_iter()
            .map(|entry| (entry.id().to_string(), entry.conversation()))
            .collect()
    }

    #[must_use]
    pub fn get_conversation(&self, cid: &str) -> Option<Conversation> {
        self.registry.get(cid).map(|entry| entry.conversation())
    }

    #[must_use]
    pub fn entry(&self, cid: &str) -> Option<Arc<ManagedConversation>> {
        self.registry.get(cid)
    }

    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.registry.len()
    }
}

impl ConversationIds for ConversationManager {
    fn generate_conversation_id(&self) -> String {
        Self::generate_conversation_id(self)
    }

    fn is_tracked(&self, cid: &str) -> bool {
        self.registry.contains(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::time::Duration;
    use colloquy_core::{BeanStore, Beans};

    struct FailingLoadStore;

    impl BeanStore for FailingLoadStore {
        fn load(&self, _target: &mut Beans) -> anyhow::Result<()> {
            bail!("store unreachable")
        }

        fn save(&self, _source: &Beans) -> anyhow::Result<()> {
            Ok(())
        }

        fn clear(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FailingLoadProvider;

    impl BeanStoreProvider for FailingLoadProvider {
        fn of(
            &self,
            _session: &SessionHandle,
            _invalidated: bool,
            _cid: &str,
        ) -> Arc<dyn BeanStore> {
            Arc::new(FailingLoadStore)
        }
    }

    fn manager() -> ConversationManager {
        ConversationManager::new(
            SessionHandle::new(),
            Arc::new(FailingLoadProvider),
            ConversationConfig::default(),
        )
    }

    fn track(manager: &ConversationManager, cid: &str) {
        let mut request = manager.new_request();
        assert!(request.begin_with_id(cid, manager).is_ok());
        assert!(manager.teardown_conversation(&mut request).is_ok());
    }

    #[test]
    fn test_generated_ids_skip_tracked_ids() {
        let manager = manager();
        track(&manager, "1");
        track(&manager, "2");

        assert_eq!(manager.generate_conversation_id(), "3");
        assert!(manager.is_tracked("1"));
        assert!(!manager.is_tracked("3"));
    }

    #[test]
    fn test_new_request_has_active_context() {
        let manager = manager();
        let request = manager.new_request();
        assert!(request.is_context_active());
        assert_eq!(
            request.conversation().timeout_ms(),
            manager.config().default_timeout_ms
        );
    }

    #[test]
    fn test_failed_restore_releases_conversation() {
        let manager = manager();
        track(&manager, "1");

        let mut request = manager.new_request();
        let result = manager.setup_conversation(&mut request, Some("1"));
        assert!(matches!(result, Err(ConversationError::Storage(_))));
        assert!(request.conversation().is_transient());

        let entry = manager.entry("1");
        assert!(entry.is_some_and(|e| !e.is_locked() && e.last_touched().is_some()));
    }

    #[test]
    fn test_entry_removed_while_waiting_is_nonexistent() {
        let manager = Arc::new(manager());
        track(&manager, "1");
        let entry = manager.entry("1").expect("tracked");
        assert!(entry.try_lock(Duration::from_millis(10)));

        let waiter = {
            let manager = manager.clone();
            std::thread::spawn(move || {
                let mut request = manager.new_request();
                manager.setup_conversation(&mut request, Some("1"))
            })
        };

        // Let the waiter block on the lock, then take the entry away.
        std::thread::sleep(Duration::from_millis(50));
        assert!(manager.registry.remove_entry(&entry));
        assert!(entry.unlock());

        let result = waiter.join().expect("waiter thread");
        assert!(matches!(result, Err(ConversationError::Nonexistent(id)) if id == "1"));
        assert!(!entry.is_locked());
        assert!(!entry.is_destroyed());
    }
}

