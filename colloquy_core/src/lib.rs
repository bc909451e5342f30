#![deny(
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

//! Core types for long-running conversation management.
//!
//! This crate holds the value types and collaborator contracts shared by the
//! rest of the workspace:
//! - [`Conversation`], the identity/timeout handle of one conversation
//! - [`ConversationError`], the error taxonomy surfaced to request handling
//! - [`BeanStore`] and [`Scheduler`], the two external contracts consumed
//!   by the conversation manager

pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod request;
pub mod scheduler;
pub mod store;

pub use config::ConversationConfig;
pub use context::{Beans, ConversationContext};
pub use conversation::{Conversation, ConversationIds};
pub use error::{ConversationError, Result};
pub use request::ConversationRequest;
pub use scheduler::{Scheduler, Task, TerminationHandle};
pub use store::{BeanStore, BeanStoreProvider, SessionHandle};
