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

//! Session-backed persistence for long-running conversations.
//!
//! Each conversation's beans live in the owning session's attribute map under
//! names namespaced by the conversation id, so several conversations share
//! one session without clobbering each other.

mod naming;
mod store;

pub use naming::NamingScheme;
pub use store::{SessionAttributes, SessionBeanStore, SessionBeanStoreProvider};
