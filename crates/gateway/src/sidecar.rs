use std::time::Duration;

use {serde_json::json, tracing::debug};

use crate::error::{Error, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Outbound client for the WhatsApp sidecar's `/send` endpoint.
pub struct SidecarClient {
    base_url: String,
    shared_secret: Option<String>,
    client: reqwest::Client,
}

impl SidecarClient {
    pub fn new(base_url: &str, shared_secret: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            shared_secret,
            client: reqwest::Client::new(),
        }
    }

    /// Deliver one text chunk to a destination identity. Best effort: a
    /// non-success status is surfaced, not retried.
    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let mut request = self
            .client
            .post(format!("{}/send", self.base_url))
            .timeout(SEND_TIMEOUT)
            .json(&json!({"to": to, "text": text}));
        if let Some(secret) = &self.shared_secret {
            request = request.header("x-sidecar-secret", secret);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(to, %status, "sidecar send");
        if !status.is_success() {
            return Err(Error::SendRejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
