//! Slash-command parsing and the per-chat conversation state machine.
//!
//! [`ChatService`] routes inbound text either to a command handler or to a
//! Codex turn against the chat's stored thread, creating and re-creating
//! threads as needed.

pub mod command;
pub mod error;
pub mod service;

pub use {
    command::{SlashCommand, parse_slash_command},
    error::{Error, Result},
    service::ChatService,
};
