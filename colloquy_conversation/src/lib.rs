#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Lifecycle management for long-running conversations.
//!
//! The [`ConversationManager`] resumes a conversation at the start of a
//! request, hands it back at the end, and destroys it once it has been idle
//! for longer than its timeout.
//!
//! # Expiry modes
//! - **Synchronous**: every entry records when it was last released, and
//!   expired entries are swept at the start of each request.
//! - **Asynchronous**: every idle entry owns a scheduled termination task
//!   which is cancelled when a request resumes it.

mod entry;
mod expiry;
mod lock;
mod manager;
mod registry;
mod scheduler;

pub use entry::ManagedConversation;
pub use expiry::ExpiryMode;
pub use lock::{ConversationLock, Unlock};
pub use manager::ConversationManager;
pub use registry::ConversationRegistry;
pub use scheduler::TokioScheduler;
