//! Sender access control for inbound WhatsApp messages.
//!
//! Identities arrive as JIDs (`local[:device]@domain`) or bare phone-number
//! strings; [`identity`] canonicalizes them so that the same number always
//! compares equal, and [`policy`] decides whether a message is processed.

pub mod identity;
pub mod policy;

pub use {
    identity::{jid_identity, normalize_jid},
    policy::{AccessMode, should_process},
};
