use serde::{Deserialize, Serialize};

/// Inbound WhatsApp message as posted by the sidecar.
///
/// The sidecar sends `from` for the chat-scoped sender id and, when the
/// sender is known under a stable account identity, `from_identity` as well.
/// On self-chat deployments `self_jid` carries the bot's own number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InboundMessage {
    #[serde(rename = "from")]
    pub from_id: String,
    #[serde(default)]
    pub from_identity: Option<String>,
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub self_jid: Option<String>,
}

/// Reply produced by the chat service for one inbound message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
}

impl ChatResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
