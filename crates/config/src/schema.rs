use std::{collections::HashSet, path::PathBuf};

use serde::{Deserialize, Serialize};

use courier_access::{AccessMode, jid_identity};

/// Application settings.
///
/// Loaded once at startup and treated as read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Address the inbound HTTP boundary binds to.
    pub app_host: String,
    /// Port the inbound HTTP boundary listens on.
    pub app_port: u16,

    /// Codex app-server executable.
    pub codex_bin: String,
    /// Model requested for every thread.
    pub codex_model: String,
    /// Working directory for the Codex subprocess.
    pub codex_cwd: Option<PathBuf>,
    /// Client name announced to the app-server.
    pub codex_client_name: String,

    /// Base URL of the WhatsApp sidecar.
    pub sidecar_url: String,
    /// Shared secret expected on inbound requests and attached to outbound
    /// sends. Unset disables the check.
    pub sidecar_shared_secret: Option<String>,

    /// Sender access mode.
    pub access_mode: AccessMode,
    /// Raw approved-sender entries (numbers or JIDs), as configured.
    pub approved_numbers: Vec<String>,

    /// SQLite database location.
    pub database_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_host: "0.0.0.0".to_string(),
            app_port: 8000,
            codex_bin: "codex".to_string(),
            codex_model: "gpt-5.3-codex".to_string(),
            codex_cwd: None,
            codex_client_name: "courier".to_string(),
            sidecar_url: "http://127.0.0.1:3001".to_string(),
            sidecar_shared_secret: None,
            access_mode: AccessMode::SelfChat,
            approved_numbers: Vec::new(),
            database_path: PathBuf::from("data/state.db"),
        }
    }
}

impl Settings {
    /// Canonicalize the approved-sender entries into a comparable set.
    ///
    /// Computed once at startup; entries may be phone numbers or full JIDs.
    pub fn approved_sender_identities(&self) -> HashSet<String> {
        self.approved_numbers
            .iter()
            .flat_map(|raw| split_list_entries(raw))
            .map(|entry| jid_identity(&entry))
            .collect()
    }
}

/// Split a configured list value on commas and newlines, dropping blanks.
pub(crate) fn split_list_entries(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
