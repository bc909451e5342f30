use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::context::Beans;

/// Persistence for the state of one long-running conversation.
pub trait BeanStore: Send + Sync {
    /// Copy persisted state into `target`.
    fn load(&self, target: &mut Beans) -> anyhow::Result<()>;

    /// Replace persisted state with `source`.
    fn save(&self, source: &Beans) -> anyhow::Result<()>;

    /// Erase all persisted state.
    fn clear(&self) -> anyhow::Result<()>;
}

/// Hands out bean stores scoped to a single conversation id.
pub trait BeanStoreProvider: Send + Sync {
    fn of(&self, session: &SessionHandle, invalidated: bool, cid: &str) -> Arc<dyn BeanStore>;
}

/// Identity of the session that owns a set of conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: Uuid,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::now_v7() }
    }

    #[must_use]
    pub const fn from_id(id: Uuid) -> Self {
        Self { id }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session {}", self.id)
    }
}
