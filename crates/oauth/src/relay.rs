use std::time::Duration;

use {tracing::debug, url::Url};

use crate::error::{Error, Result};

/// Where Codex listens for its login callback when no redirect target was
/// captured at `/auth login` time.
pub const DEFAULT_CODEX_CALLBACK_URL: &str = "http://127.0.0.1:1455/auth/callback";

/// The only query parameters forwarded to the callback listener, in order.
const FORWARDED_KEYS: [&str; 4] = ["code", "state", "error", "error_description"];

const REPLAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Extract the `redirect_uri` parameter from an OAuth authorization URL.
///
/// Returns `None` unless the URL is http(s) and carries a non-empty
/// `redirect_uri` that is itself an absolute http(s) URL with a host.
pub fn extract_expected_redirect_uri(auth_url: &str) -> Option<String> {
    let parsed = Url::parse(auth_url).ok()?;
    if !is_http(&parsed) {
        return None;
    }

    let redirect_uri = parsed
        .query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.trim().to_string())?;
    if redirect_uri.is_empty() {
        return None;
    }

    let target = Url::parse(&redirect_uri).ok()?;
    if !is_http(&target) || target.host_str().is_none() {
        return None;
    }

    Some(redirect_uri)
}

/// Build the URL that replays a completed OAuth redirect to Codex.
///
/// The callback URL must be an absolute http(s) URL whose query looks like a
/// finished OAuth redirect (`code`+`state`, or `error`+`state`). Only the
/// recognized auth parameters are forwarded; everything else, including the
/// fragment, is dropped. The destination is the redirect target stored at
/// login time, falling back to [`DEFAULT_CODEX_CALLBACK_URL`].
pub fn build_callback_replay_url(
    expected_redirect_uri: Option<&str>,
    callback_url: &str,
) -> Result<String> {
    let callback = Url::parse(callback_url.trim()).map_err(|_| Error::InvalidCallbackUrl)?;
    if !is_http(&callback) || callback.host_str().is_none() {
        return Err(Error::InvalidCallbackUrl);
    }

    let pairs: Vec<(String, String)> = callback
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let has_key = |key: &str| pairs.iter().any(|(k, _)| k == key);
    let has_success = has_key("code") && has_key("state");
    let has_error = has_key("error") && has_key("state");
    if !has_success && !has_error {
        return Err(Error::MissingAuthParams);
    }

    let destination = expected_redirect_uri.unwrap_or(DEFAULT_CODEX_CALLBACK_URL);
    let destination = Url::parse(destination).map_err(|_| Error::InvalidDestination)?;
    if !is_http(&destination) || destination.host_str().is_none() {
        return Err(Error::InvalidDestination);
    }

    let mut replay = destination.clone();
    replay.set_query(None);
    replay.set_fragment(None);
    if matches!(destination.path(), "" | "/") {
        replay.set_path("/auth/callback");
    }
    {
        let mut query = replay.query_pairs_mut();
        for key in FORWARDED_KEYS {
            for (k, value) in &pairs {
                if k == key {
                    query.append_pair(k, value);
                }
            }
        }
    }

    Ok(replay.to_string())
}

/// Replay the OAuth callback to Codex's local callback listener.
///
/// Redirect following is disabled: the listener answers a successful login
/// with a redirect, which must not be mistaken for a failure (or followed
/// out to the network).
pub async fn replay_callback(replay_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(REPLAY_TIMEOUT)
        .build()?;

    let response = client.get(replay_url).send().await?;
    let status = response.status();
    debug!(%status, "replayed auth callback");
    if status.as_u16() >= 400 {
        return Err(Error::RelayStatus {
            status: status.as_u16(),
        });
    }
    Ok(())
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
