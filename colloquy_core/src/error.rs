use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConversationError>;

/// Errors surfaced by conversation handling.
///
/// Lock timeouts, cancelled timers and other primitives never leak through;
/// they are always folded into one of these kinds. Besides the five
/// conversation-handling kinds there is [`ConversationError::Storage`], raised
/// only when a `BeanStore` fails while restoring or persisting state, so
/// callers matching on the five should handle it too.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Conversation context is not active")]
    ContextNotActive,

    #[error("Illegal conversation state: {0}")]
    IllegalState(&'static str),

    #[error("Conversation id already in use: {0}")]
    DuplicateId(String),

    #[error("No conversation found to restore for id: {0}")]
    Nonexistent(String),

    #[error("Conversation is busy: {0}")]
    Busy(String),

    #[error("Bean store error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl ConversationError {
    /// Whether the caller may reasonably retry the whole request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
