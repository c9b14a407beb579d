use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use courier_common::InboundMessage;

use crate::identity::jid_identity;

/// Who may talk to the bot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Only the bot's own number (self-chat deployments).
    #[default]
    SelfChat,
    /// Only numbers on the configured approved-senders list.
    ApprovedSenders,
}

/// Decide whether an inbound message should be processed.
///
/// Group messages are always rejected. In self-chat mode the sender must
/// canonicalize to the bot's own identity (the `from_me` flag is irrelevant:
/// self-chat echoes and stable-identity aliases both compare equal). In
/// approved-senders mode the bot's own echoes are rejected and an empty
/// approved set fails closed.
pub fn should_process(
    message: &InboundMessage,
    access_mode: AccessMode,
    approved_identities: &HashSet<String>,
) -> bool {
    if message.is_group {
        return false;
    }

    let sender = message.from_identity.as_deref().unwrap_or(&message.from_id);

    match access_mode {
        AccessMode::SelfChat => {
            let Some(self_jid) = message.self_jid.as_deref() else {
                return false;
            };
            jid_identity(sender) == jid_identity(self_jid)
        },
        AccessMode::ApprovedSenders => {
            if message.from_me {
                return false;
            }
            if approved_identities.is_empty() {
                return false;
            }
            approved_identities.contains(&jid_identity(sender))
        },
    }
}
