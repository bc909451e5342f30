//! The conversation value type.
//!
//! A `Conversation` is copied around rather than shared: the request holds
//! one, and each tracked long-running conversation keeps a snapshot in its
//! registry entry.

use std::fmt;

use crate::context::ConversationContext;
use crate::error::{ConversationError, Result};

/// Source of conversation ids and knowledge of which ids are taken.
pub trait ConversationIds {
    /// Produce an id not currently used by a tracked conversation.
    fn generate_conversation_id(&self) -> String;

    /// Whether `cid` names a tracked long-running conversation.
    fn is_tracked(&self, cid: &str) -> bool;
}

/// Identity, timeout and transient/long-running state of one conversation.
///
/// A conversation is long-running exactly when it has an id.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Option<String>,
    timeout_ms: u64,
    resumed_id: Option<String>,
}

impl Conversation {
    /// Create a new transient conversation.
    #[must_use]
    pub const fn new(timeout_ms: u64) -> Self {
        Self {
            id: None,
            timeout_ms,
            resumed_id: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.id.is_none()
    }

    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub const fn set_timeout_ms(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    /// Id of the long-running conversation this one took over during setup.
    #[must_use]
    pub fn resumed_id(&self) -> Option<&str> {
        self.resumed_id.as_deref()
    }

    /// Promote to long-running under a freshly generated id.
    pub fn begin<I>(&mut self, context: &ConversationContext, ids: &I) -> Result<()>
    where
        I: ConversationIds + ?Sized,
    {
        Self::check_active(context)?;
        self.check_transient()?;
        self.id = Some(ids.generate_conversation_id());
        Ok(())
    }

    /// Promote to long-running under an explicit id.
    pub fn begin_with_id<I>(
        &mut self,
        id: impl Into<String>,
        context: &ConversationContext,
        ids: &I,
    ) -> Result<()>
    where
        I: ConversationIds + ?Sized,
    {
        Self::check_active(context)?;
        self.check_transient()?;
        let id = id.into();
        if id.is_empty() {
            return Err(ConversationError::IllegalState("begin with empty id"));
        }
        if ids.is_tracked(&id) {
            return Err(ConversationError::DuplicateId(id));
        }
        self.id = Some(id);
        Ok(())
    }

    /// Demote back to transient. State is destroyed at the end of the request.
    pub fn end(&mut self, context: &ConversationContext) -> Result<()> {
        Self::check_active(context)?;
        if self.is_transient() {
            return Err(ConversationError::IllegalState("end on transient"));
        }
        self.id = None;
        Ok(())
    }

    /// Take over the identity of `other`, remembering which id was resumed.
    pub fn switch_to(&mut self, other: &Self) {
        self.id.clone_from(&other.id);
        self.timeout_ms = other.timeout_ms;
        self.resumed_id.clone_from(&other.id);
    }

    fn check_active(context: &ConversationContext) -> Result<()> {
        if context.is_active() {
            Ok(())
        } else {
            Err(ConversationError::ContextNotActive)
        }
    }

    fn check_transient(&self) -> Result<()> {
        if self.is_transient() {
            Ok(())
        } else {
            Err(ConversationError::IllegalState("begin on long-running"))
        }
    }
}

// Two transient conversations are never equal to each other.
impl PartialEq for Conversation {
    fn eq(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "conversation {id}"),
            None => f.write_str("transient conversation"),
        }
    }
}
