use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use courier_access::AccessMode;

use crate::schema::{Settings, split_list_entries};

/// Config file name, checked in the working directory.
const CONFIG_FILENAME: &str = "courier.toml";

/// Load settings from the given TOML file.
pub fn load_settings(path: &Path) -> Result<Settings, Error> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover `courier.toml`, apply environment overrides, and validate.
///
/// Falls back to [`Settings::default`] when no config file is present; a
/// malformed file is an error rather than silently ignored.
pub fn discover_and_load() -> Result<Settings, Error> {
    let path = PathBuf::from(CONFIG_FILENAME);
    let mut settings = if path.exists() {
        debug!(path = %path.display(), "loading config");
        load_settings(&path)?
    } else {
        debug!("no config file found, using defaults");
        Settings::default()
    };

    apply_env_overrides(&mut settings);

    if settings.access_mode == AccessMode::ApprovedSenders
        && settings.approved_sender_identities().is_empty()
    {
        warn!("no approved WhatsApp senders configured; inbound messages will be ignored");
    }

    Ok(settings)
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup (testable core of
/// [`apply_env_overrides`]).
pub fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(value) = lookup("APP_HOST") {
        settings.app_host = value;
    }
    if let Some(value) = lookup("APP_PORT") {
        match value.parse() {
            Ok(port) => settings.app_port = port,
            Err(_) => warn!(value = %value, "ignoring unparseable APP_PORT"),
        }
    }
    if let Some(value) = lookup("CODEX_BIN") {
        settings.codex_bin = value;
    }
    if let Some(value) = lookup("CODEX_MODEL") {
        settings.codex_model = value;
    }
    if let Some(value) = lookup("CODEX_CWD") {
        settings.codex_cwd = Some(PathBuf::from(value));
    }
    if let Some(value) = lookup("CODEX_CLIENT_NAME") {
        settings.codex_client_name = value;
    }
    if let Some(value) = lookup("SIDECAR_URL") {
        settings.sidecar_url = value;
    }
    if let Some(value) = lookup("SIDECAR_SHARED_SECRET") {
        settings.sidecar_shared_secret = Some(value);
    }
    if let Some(value) = lookup("WHATSAPP_ACCESS_MODE") {
        settings.access_mode = normalize_access_mode(&value);
    }
    if let Some(value) = lookup("WHATSAPP_APPROVED_NUMBERS") {
        settings.approved_numbers = split_list_entries(&value);
    }
    if let Some(value) = lookup("DATABASE_PATH") {
        settings.database_path = PathBuf::from(value);
    }
}

/// Normalize a configured access mode, defaulting unrecognized values to
/// self-chat with a logged warning.
pub fn normalize_access_mode(value: &str) -> AccessMode {
    match value.trim().to_lowercase().as_str() {
        "approved_senders" => AccessMode::ApprovedSenders,
        "self_chat" => AccessMode::SelfChat,
        other => {
            warn!(value = other, "invalid WHATSAPP_ACCESS_MODE, defaulting to self_chat");
            AccessMode::SelfChat
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
