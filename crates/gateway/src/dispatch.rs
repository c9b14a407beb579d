use std::collections::HashSet;

use tracing::{error, info};

use {
    courier_access::{AccessMode, jid_identity, normalize_jid, should_process},
    courier_chat::ChatService,
    courier_common::InboundMessage,
};

use crate::{error::Result, locks::ChatLocks, sidecar::SidecarClient};

/// WhatsApp rejects messages past this length; longer replies are split.
const MAX_CHUNK_CHARS: usize = 3000;

const INTERNAL_ERROR_TEXT: &str = "I hit an internal error while handling that message.";
const EMPTY_RESPONSE_TEXT: &str = "I could not generate a response.";

/// Applies the access policy, serializes per-chat processing, and forwards
/// replies to the sidecar.
pub struct Dispatcher {
    service: ChatService,
    sidecar: SidecarClient,
    locks: ChatLocks,
    access_mode: AccessMode,
    approved_identities: HashSet<String>,
}

impl Dispatcher {
    pub fn new(
        service: ChatService,
        sidecar: SidecarClient,
        locks: ChatLocks,
        access_mode: AccessMode,
        approved_identities: HashSet<String>,
    ) -> Self {
        Self {
            service,
            sidecar,
            locks,
            access_mode,
            approved_identities,
        }
    }

    /// Process one inbound message end to end. Never returns an error: a
    /// policy rejection is a silent drop, and a processing failure is
    /// reported back to the chat on a best-effort basis.
    pub async fn process(&self, message: InboundMessage) {
        if !should_process(&message, self.access_mode, &self.approved_identities) {
            info!(
                mode = ?self.access_mode,
                from = %message.from_id,
                from_identity = ?message.from_identity,
                from_me = message.from_me,
                is_group = message.is_group,
                "ignoring inbound by access policy"
            );
            return;
        }

        let chat_key = normalize_jid(&message.from_id);
        let reply_to = self.reply_target(&message).to_string();
        info!(
            mode = ?self.access_mode,
            from = %message.from_id,
            reply_to = %reply_to,
            "processing inbound"
        );

        // One in-flight turn per chat; distinct chats proceed concurrently.
        let _guard = self.locks.shard(&chat_key).lock().await;

        if let Err(err) = self.handle_and_reply(&chat_key, &reply_to, &message.text).await {
            error!(error = %err, "failed to handle inbound message");
            if let Err(err) = self.sidecar.send_text(&reply_to, INTERNAL_ERROR_TEXT).await {
                error!(error = %err, "failed to send error notification");
            }
        }
    }

    async fn handle_and_reply(&self, chat_key: &str, reply_to: &str, text: &str) -> Result<()> {
        let response = self.service.handle_message(chat_key, text).await?;
        for chunk in chunk_text(&response.text) {
            self.sidecar.send_text(reply_to, &chunk).await?;
        }
        Ok(())
    }

    /// Replies normally go back to the chat-scoped sender id. On self-chat
    /// deployments a message may arrive under a stable-identity alias; when
    /// that alias is the bot's own number, reply to it so the response lands
    /// in the user-visible chat.
    fn reply_target<'a>(&self, message: &'a InboundMessage) -> &'a str {
        if self.access_mode == AccessMode::SelfChat
            && let (Some(from_identity), Some(self_jid)) =
                (message.from_identity.as_deref(), message.self_jid.as_deref())
            && jid_identity(from_identity) == jid_identity(self_jid)
        {
            return from_identity;
        }
        &message.from_id
    }
}

/// Split response text into sidecar-sized chunks, preferring the last
/// newline boundary at or before the budget and hard-cutting when a chunk
/// has no newline.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_with_budget(text, MAX_CHUNK_CHARS)
}

fn chunk_with_budget(text: &str, max_chars: usize) -> Vec<String> {
    let clean = text.trim();
    if clean.is_empty() {
        return vec![EMPTY_RESPONSE_TEXT.to_string()];
    }
    if clean.chars().count() <= max_chars {
        return vec![clean.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = clean;
    while remaining.chars().count() > max_chars {
        let budget = byte_index_of_char(remaining, max_chars);
        let split_at = match remaining[..budget].rfind('\n') {
            Some(idx) if idx > 0 => idx,
            _ => budget,
        };
        chunks.push(remaining[..split_at].trim().to_string());
        remaining = remaining[split_at..].trim();
    }
    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// Byte offset of the `n`-th character, or the string's end.
fn byte_index_of_char(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(idx, _)| idx)
}
