use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::error::Result;

/// Reply sent when a turn produced a disallowed item and was interrupted.
pub const BLOCKED_TURN_TEXT: &str = "I can only do chat and research (web search + URL fetch). \
     This request attempted a disallowed action.";

/// Reply sent when a turn finished without any final response text.
pub const EMPTY_TURN_FALLBACK: &str =
    "I could not produce a response for that request. Please try rephrasing it.";

/// A thread as reported by the app-server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThreadSummary {
    pub id: String,
    pub preview: Option<String>,
}

/// Authenticated account details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "type")]
    pub account_type: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan_type: Option<String>,
}

/// Account state; `account` is `None` when not logged in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AccountInfo {
    pub account: Option<Account>,
}

/// Handle for a login started on the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginStart {
    pub login_id: String,
    pub auth_url: String,
}

/// Outcome of one executed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnResult {
    pub text: String,
    pub status: String,
    pub blocked_item_type: Option<String>,
}

/// Map a finished turn into the reply shown to the user.
///
/// A blocked turn always yields the fixed research-only refusal, whatever
/// partial response the backend produced before the interrupt landed.
pub fn turn_result_from(
    status: impl Into<String>,
    final_response: Option<String>,
    blocked_item_type: Option<String>,
) -> TurnResult {
    let status = status.into();
    if blocked_item_type.is_some() {
        return TurnResult {
            text: BLOCKED_TURN_TEXT.to_string(),
            status,
            blocked_item_type,
        };
    }
    let text = match final_response {
        Some(text) if !text.is_empty() => text,
        _ => EMPTY_TURN_FALLBACK.to_string(),
    };
    TurnResult {
        text,
        status,
        blocked_item_type: None,
    }
}

/// The Codex capability surface the bridge consumes.
///
/// [`AppServerClient`](crate::app_server::AppServerClient) is the production
/// implementation; tests substitute lightweight mocks.
#[async_trait]
pub trait CodexClient: Send + Sync {
    /// Start a new thread, optionally naming it.
    async fn thread_start(&self, title: Option<&str>) -> Result<ThreadSummary>;

    /// Resume an existing thread on the backend.
    async fn thread_resume(&self, thread_id: &str) -> Result<ThreadSummary>;

    /// List recent threads, most recently updated first.
    async fn thread_list(&self, limit: usize) -> Result<Vec<ThreadSummary>>;

    /// Start backend-side compaction of a thread.
    async fn thread_compact_start(&self, thread_id: &str) -> Result<()>;

    /// Read account information, optionally forcing a token refresh.
    async fn account_read(&self, refresh_token: bool) -> Result<AccountInfo>;

    /// Start a ChatGPT login flow.
    async fn account_login_start(&self) -> Result<LoginStart>;

    /// Cancel a pending login.
    async fn account_login_cancel(&self, login_id: &str) -> Result<()>;

    /// Run one conversation turn with research-only policy enforcement.
    async fn run_turn(
        &self,
        thread_id: &str,
        text: &str,
        developer_instructions: &str,
    ) -> Result<TurnResult>;

    /// Restart the backend subprocess (picks up freshly written credentials).
    async fn restart(&self) -> Result<()>;
}
