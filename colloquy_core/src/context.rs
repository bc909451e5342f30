use std::collections::HashMap;

use serde_json::Value;
use tracing::{trace, warn};

use crate::store::BeanStore;

/// Conversation-scoped state, keyed by bean name.
pub type Beans = HashMap<String, Value>;

/// The request-local conversation context.
///
/// Holds the active flag and the transient bean map the request works
/// against. Long-running state is copied in from a [`BeanStore`] when a
/// conversation is resumed and copied back out when the request ends.
#[derive(Debug, Default)]
pub struct ConversationContext {
    active: bool,
    beans: Beans,
}

impl ConversationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&mut self) {
        if self.active {
            warn!("Conversation context already active");
        }
        self.active = true;
    }

    pub const fn deactivate(&mut self) {
        self.active = false;
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.beans.get(name)
    }

    pub fn put(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.beans.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.beans.remove(name)
    }

    #[must_use]
    pub const fn beans(&self) -> &Beans {
        &self.beans
    }

    /// Restore persisted state into the transient store.
    pub fn load_from(&mut self, store: &dyn BeanStore) -> anyhow::Result<()> {
        store.load(&mut self.beans)?;
        trace!("Restored {} beans into conversation context", self.beans.len());
        Ok(())
    }

    /// Persist the transient store.
    pub fn save_into(&self, store: &dyn BeanStore) -> anyhow::Result<()> {
        store.save(&self.beans)?;
        trace!("Persisted {} beans from conversation context", self.beans.len());
        Ok(())
    }

    /// Drop all transient state.
    pub fn destroy(&mut self) {
        trace!("Destroying {} transient beans", self.beans.len());
        self.beans.clear();
    }
}
