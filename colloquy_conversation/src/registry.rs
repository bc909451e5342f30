use std::sync::Arc;

use dashmap::DashMap;

use crate::entry::ManagedConversation;

/// Thread-safe map of conversation id to tracked entry.
///
/// Per-key operations are atomic; iteration only ever sees a snapshot.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    entries: DashMap<String, Arc<ManagedConversation>>,
}

impl ConversationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, cid: &str) -> Option<Arc<ManagedConversation>> {
        self.entries.get(cid).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn contains(&self, cid: &str) -> bool {
        self.entries.contains_key(cid)
    }

    /// Insert `entry` under its id, returning whatever it replaced.
    pub fn put(&self, entry: Arc<ManagedConversation>) -> Option<Arc<ManagedConversation>> {
        self.entries.insert(entry.id().to_string(), entry)
    }

    pub fn remove(&self, cid: &str) -> Option<Arc<ManagedConversation>> {
        self.entries.remove(cid).map(|(_, entry)| entry)
    }

    /// Remove `cid` only while it still maps to `entry`.
    pub fn remove_entry(&self, entry: &Arc<ManagedConversation>) -> bool {
        self.entries
            .remove_if(entry.id(), |_, current| Arc::ptr_eq(current, entry))
            .is_some()
    }

    #[must_use]
    pub fn values_snapshot(&self) -> Vec<Arc<ManagedConversation>> {
        self.entries.iter().map(|r| r.value().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
