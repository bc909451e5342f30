use crate::context::ConversationContext;
use crate::conversation::{Conversation, ConversationIds};
use crate::error::Result;

/// Per-request view of the current conversation.
///
/// One of these lives for the duration of a request. The conversation
/// manager switches its identity during setup and persists or discards its
/// state during teardown.
#[derive(Debug)]
pub struct ConversationRequest {
    conversation: Conversation,
    context: ConversationContext,
}

impl ConversationRequest {
    /// Create a request bound to a new transient conversation.
    #[must_use]
    pub fn new(default_timeout_ms: u64) -> Self {
        Self {
            conversation: Conversation::new(default_timeout_ms),
            context: ConversationContext::new(),
        }
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub const fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    #[must_use]
    pub const fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub const fn context_mut(&mut self) -> &mut ConversationContext {
        &mut self.context
    }

    #[must_use]
    pub const fn is_context_active(&self) -> bool {
        self.context.is_active()
    }

    pub fn begin<I>(&mut self, ids: &I) -> Result<()>
    where
        I: ConversationIds + ?Sized,
    {
        self.conversation.begin(&self.context, ids)
    }

    pub fn begin_with_id<I>(&mut self, id: impl Into<String>, ids: &I) -> Result<()>
    where
        I: ConversationIds + ?Sized,
    {
        self.conversation.begin_with_id(id, &self.context, ids)
    }

    pub fn end(&mut self) -> Result<()> {
        self.conversation.end(&self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversationError;

    struct FixedIds(&'static str);

    impl ConversationIds for FixedIds {
        fn generate_conversation_id(&self) -> String {
            "7".to_string()
        }

        fn is_tracked(&self, cid: &str) -> bool {
            cid == self.0
        }
    }

    fn active_request() -> ConversationRequest {
        let mut request = ConversationRequest::new(1000);
        request.context_mut().activate();
        request
    }

    #[test]
    fn test_new_request_is_transient_and_inactive() {
        let request = ConversationRequest::new(250);
        assert!(request.conversation().is_transient());
        assert_eq!(request.conversation().timeout_ms(), 250);
        assert!(!request.is_context_active());
    }

    #[test]
    fn test_begin_requires_active_context() {
        let mut request = ConversationRequest::new(1000);
        assert!(matches!(
            request.begin(&FixedIds("")),
            Err(ConversationError::ContextNotActive)
        ));
    }

    #[test]
    fn test_begin_then_end() {
        let mut request = active_request();
        assert!(request.begin(&FixedIds("")).is_ok());
        assert_eq!(request.conversation().id(), Some("7"));

        assert!(request.end().is_ok());
        assert!(request.conversation().is_transient());
    }

    #[test]
    fn test_begin_with_tracked_id_is_rejected() {
        let mut request = active_request();
        let result = request.begin_with_id("taken", &FixedIds("taken"));
        assert!(matches!(result, Err(ConversationError::DuplicateId(id)) if id == "taken"));
        assert!(request.conversation().is_transient());
    }
}
