//! OAuth callback relay for Codex sign-in over WhatsApp.
//!
//! Codex runs its login callback listener on localhost of the machine the
//! bridge runs on, while the user signs in from their own browser. The relay
//! rewrites the redirect URL the user lands on into a request against that
//! local listener and delivers it.

pub mod error;
pub mod relay;

pub use {
    error::{Error, Result},
    relay::{
        DEFAULT_CODEX_CALLBACK_URL, build_callback_replay_url, extract_expected_redirect_uri,
        replay_callback,
    },
};
