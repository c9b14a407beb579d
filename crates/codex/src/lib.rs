//! Codex app-server integration.
//!
//! [`client::CodexClient`] is the capability surface the rest of the bridge
//! consumes: thread lifecycle, account/login management, and turn execution.
//! [`app_server::AppServerClient`] implements it over a `codex app-server`
//! subprocess speaking newline-delimited JSON-RPC; tests provide mocks.

pub mod app_server;
pub mod client;
pub mod error;
pub mod policy;
pub mod prompt;

pub use {
    app_server::{AppServerClient, AppServerConfig},
    client::{Account, AccountInfo, CodexClient, LoginStart, ThreadSummary, TurnResult},
    error::{Error, Result},
    prompt::RESEARCH_ONLY_SYSTEM_PROMPT,
};
