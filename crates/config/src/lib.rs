//! Configuration loading for the courier bridge.
//!
//! Config file: `courier.toml`, searched in the working directory. Every
//! value can be overridden through the environment (the variable names the
//! deployment scripts use: `APP_HOST`, `WHATSAPP_ACCESS_MODE`, ...). The
//! loaded [`Settings`] value is immutable and passed to every component at
//! construction.

pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, discover_and_load, load_settings, normalize_access_mode},
    schema::Settings,
};
