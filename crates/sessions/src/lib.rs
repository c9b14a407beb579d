//! Durable session state for the courier bridge.
//!
//! One SQLite database holds the chat → Codex-thread mapping and the single
//! pending-login slot. The schema is self-migrating: opening a database
//! created by an older build adds any missing columns in place.

pub mod error;
pub mod store;

pub use {
    error::{Error, Result},
    store::{PendingLogin, SessionStore},
};
