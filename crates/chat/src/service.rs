use std::{sync::Arc, time::Duration};

use tracing::{info, warn};

use {
    courier_codex::{Account, CodexClient, RESEARCH_ONLY_SYSTEM_PROMPT, TurnResult},
    courier_common::ChatResponse,
    courier_oauth::{build_callback_replay_url, replay_callback},
    courier_sessions::SessionStore,
};

use crate::{
    command::{SlashCommand, parse_slash_command},
    error::Result,
};

const HELP_TEXT: &str = "Available commands:\n\
     /new [title]\n\
     /sessions [limit]\n\
     /resume <thread_id|index>\n\
     /compact [instructions]\n\
     /auth status|login|complete|cancel [login_id]\n\
     /help";

const SESSION_EXPIRED_TEXT: &str =
    "Session expired and could not be recovered. Send /new and try again.";

/// Shown when the callback was relayed but the authenticated account has not
/// appeared yet; `/auth complete` stays retryable because the pending login
/// is left in place.
const AUTH_DELAYED_TEXT: &str =
    "Callback relayed; auth may be delayed, run /auth status in 10-20s.";

const SESSIONS_DEFAULT_LIMIT: usize = 5;
const SESSIONS_MAX_LIMIT: usize = 20;
const PREVIEW_MAX_CHARS: usize = 80;

const LOGIN_POLL_TIMEOUT: Duration = Duration::from_secs(12);
const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(600);

/// Routes inbound text to command handling or turn execution and owns the
/// chat → thread state transitions.
pub struct ChatService {
    store: SessionStore,
    codex: Arc<dyn CodexClient>,
    login_poll_timeout: Duration,
    login_poll_interval: Duration,
}

impl ChatService {
    pub fn new(store: SessionStore, codex: Arc<dyn CodexClient>) -> Self {
        Self {
            store,
            codex,
            login_poll_timeout: LOGIN_POLL_TIMEOUT,
            login_poll_interval: LOGIN_POLL_INTERVAL,
        }
    }

    /// Override the login-completion poll schedule (tests).
    pub fn with_login_poll(mut self, timeout: Duration, interval: Duration) -> Self {
        self.login_poll_timeout = timeout;
        self.login_poll_interval = interval;
        self
    }

    /// The underlying session store.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Handle one inbound message, routing to a command or a Codex turn.
    pub async fn handle_message(&self, chat_id: &str, text: &str) -> Result<ChatResponse> {
        if let Some(command) = parse_slash_command(text) {
            return self.handle_command(chat_id, &command).await;
        }

        let thread_id = match self.store.thread_for_chat(chat_id).await? {
            Some(thread_id) => thread_id,
            None => self.start_and_persist_thread(chat_id, None).await?,
        };

        let result = match self.run_turn(&thread_id, text).await {
            Ok(result) => result,
            Err(courier_codex::Error::ThreadNotFound { .. }) => {
                // The backend lost the thread; re-provision once. A second
                // loss means the session is unrecoverable.
                info!(chat_id, thread_id = %thread_id, "thread lost, provisioning a fresh one");
                let fresh = self.start_and_persist_thread(chat_id, None).await?;
                match self.run_turn(&fresh, text).await {
                    Ok(result) => result,
                    Err(courier_codex::Error::ThreadNotFound { .. }) => {
                        return Ok(ChatResponse::new(SESSION_EXPIRED_TEXT));
                    },
                    Err(error) => return Err(error.into()),
                }
            },
            Err(error) => return Err(error.into()),
        };

        Ok(ChatResponse::new(result.text))
    }

    async fn run_turn(&self, thread_id: &str, text: &str) -> courier_codex::Result<TurnResult> {
        self.codex
            .run_turn(thread_id, text, RESEARCH_ONLY_SYSTEM_PROMPT)
            .await
    }

    async fn start_and_persist_thread(
        &self,
        chat_id: &str,
        title: Option<&str>,
    ) -> Result<String> {
        let thread = self.codex.thread_start(title).await?;
        self.store.set_thread_for_chat(chat_id, &thread.id).await?;
        Ok(thread.id)
    }

    async fn handle_command(&self, chat_id: &str, command: &SlashCommand) -> Result<ChatResponse> {
        match command.name.as_str() {
            "help" => Ok(ChatResponse::new(HELP_TEXT)),
            "new" => {
                let title = Some(command.args.trim()).filter(|t| !t.is_empty());
                let thread_id = self.start_and_persist_thread(chat_id, title).await?;
                Ok(ChatResponse::new(format!(
                    "Started new session: `{thread_id}`"
                )))
            },
            "sessions" => self.handle_sessions(&command.args).await,
            "resume" => self.handle_resume(chat_id, &command.args).await,
            "compact" => {
                let Some(thread_id) = self.store.thread_for_chat(chat_id).await? else {
                    return Ok(ChatResponse::new("No active session. Use /new first."));
                };
                self.codex.thread_compact_start(&thread_id).await?;
                Ok(ChatResponse::new(
                    "Compaction started for the active session.",
                ))
            },
            "auth" => self.handle_auth_command(command).await,
            _ => Ok(ChatResponse::new("Unknown command. Send /help.")),
        }
    }

    async fn handle_sessions(&self, args: &str) -> Result<ChatResponse> {
        let limit = parse_limit(args, SESSIONS_DEFAULT_LIMIT, SESSIONS_MAX_LIMIT);
        let threads = self.codex.thread_list(limit).await?;
        if threads.is_empty() {
            return Ok(ChatResponse::new("No sessions found."));
        }

        let mut lines = vec!["Sessions:".to_string()];
        for (idx, thread) in threads.iter().enumerate() {
            let preview = thread
                .preview
                .as_deref()
                .map(preview_line)
                .unwrap_or_default();
            let preview_part = if preview.is_empty() {
                String::new()
            } else {
                format!(" — {preview}")
            };
            lines.push(format!("{}. `{}`{preview_part}", idx + 1, thread.id));
        }
        Ok(ChatResponse::new(lines.join("\n")))
    }

    async fn handle_resume(&self, chat_id: &str, args: &str) -> Result<ChatResponse> {
        let arg = args.trim();
        if arg.is_empty() {
            return Ok(ChatResponse::new("Usage: /resume <thread_id|index>"));
        }

        let thread_id = if is_digits(arg)
            && let Ok(index) = arg.parse::<usize>()
        {
            if index == 0 {
                return Ok(ChatResponse::new("Index must be 1 or higher."));
            }
            let threads = self.codex.thread_list(index.max(20)).await?;
            if index > threads.len() {
                return Ok(ChatResponse::new(format!(
                    "Only {} sessions available in this page.",
                    threads.len()
                )));
            }
            threads[index - 1].id.clone()
        } else {
            arg.to_string()
        };

        // No validation here: a bad id surfaces on the next turn.
        self.codex.thread_resume(&thread_id).await?;
        self.store.set_thread_for_chat(chat_id, &thread_id).await?;
        Ok(ChatResponse::new(format!("Resumed session: `{thread_id}`")))
    }

    async fn handle_auth_command(&self, command: &SlashCommand) -> Result<ChatResponse> {
        let (action, rest) = split_auth_action(&command.args);

        match action.as_str() {
            "status" => {
                let info = self.codex.account_read(true).await?;
                let Some(account) = info.account else {
                    return Ok(ChatResponse::new(
                        "Auth: not logged in. Run /auth login and try again.",
                    ));
                };
                Ok(ChatResponse::new(format!(
                    "Auth: {}{}",
                    account.account_type,
                    account_details(&account)
                )))
            },
            "login" => {
                let login = self.codex.account_login_start().await?;
                let expected = courier_oauth::extract_expected_redirect_uri(&login.auth_url);
                self.store
                    .set_pending_login(&login.login_id, Some(&login.auth_url), expected.as_deref())
                    .await?;
                Ok(ChatResponse::new(format!(
                    "1) Open this URL and sign in: {}\n\
                     2) Copy the final browser redirect URL and send: /auth complete <full_url>",
                    login.auth_url
                )))
            },
            "complete" => self.handle_auth_complete(rest).await,
            "apikey" => Ok(ChatResponse::new(
                "API key via WhatsApp is disabled. Use OPENAI_API_KEY env var.",
            )),
            "cancel" => {
                let pending = self.store.pending_login().await?;
                let login_id = if rest.is_empty() {
                    pending.map(|p| p.login_id)
                } else {
                    Some(rest.to_string())
                };
                let Some(login_id) = login_id else {
                    return Ok(ChatResponse::new(
                        "No pending login id found. Use /auth login first.",
                    ));
                };
                self.codex.account_login_cancel(&login_id).await?;
                self.store.clear_pending_login().await?;
                Ok(ChatResponse::new(format!("Cancelled login: {login_id}")))
            },
            _ => Ok(ChatResponse::new(
                "Usage: /auth status|login|complete|cancel [login_id]",
            )),
        }
    }

    async fn handle_auth_complete(&self, callback_url: &str) -> Result<ChatResponse> {
        if callback_url.is_empty() {
            return Ok(ChatResponse::new("Usage: /auth complete <full_url>"));
        }

        let Some(pending) = self.store.pending_login().await? else {
            return Ok(ChatResponse::new(
                "No pending login found. Run /auth login first.",
            ));
        };

        let replay_url =
            match build_callback_replay_url(pending.expected_redirect_uri.as_deref(), callback_url)
            {
                Ok(url) => url,
                Err(error) => return Ok(ChatResponse::new(error.to_string())),
            };

        if let Err(error) = replay_callback(&replay_url).await {
            warn!(error = %error, "auth callback replay failed");
            return Ok(ChatResponse::new(
                "Could not complete login from that callback URL. Try /auth login again.",
            ));
        }

        // Restart so the app-server picks up the freshly written credentials.
        if let Err(error) = self.codex.restart().await {
            warn!(error = %error, "codex restart after login failed");
            return Ok(ChatResponse::new(AUTH_DELAYED_TEXT));
        }

        match self.wait_for_chatgpt_login().await? {
            Some(account) => {
                self.store.clear_pending_login().await?;
                Ok(ChatResponse::new(format!(
                    "Sign-in completed: chatgpt{}",
                    account_details(&account)
                )))
            },
            // Leave the pending login intact so /auth complete can be
            // retried once the account shows up.
            None => Ok(ChatResponse::new(AUTH_DELAYED_TEXT)),
        }
    }

    async fn wait_for_chatgpt_login(&self) -> Result<Option<Account>> {
        let mut elapsed = Duration::ZERO;
        while elapsed <= self.login_poll_timeout {
            let info = self.codex.account_read(true).await?;
            if let Some(account) = info.account
                && account.account_type == "chatgpt"
            {
                return Ok(Some(account));
            }
            tokio::time::sleep(self.login_poll_interval).await;
            elapsed += self.login_poll_interval;
        }
        Ok(None)
    }
}

/// Parse a numeric limit argument with bounds checking; anything malformed
/// or non-positive silently falls back to the default.
fn parse_limit(raw: &str, default: usize, max_value: usize) -> usize {
    let value = raw.trim();
    if !is_digits(value) {
        return default;
    }
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => parsed.min(max_value),
        _ => default,
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Collapse a thread preview onto one bounded line.
fn preview_line(preview: &str) -> String {
    preview
        .trim()
        .replace('\n', " ")
        .chars()
        .take(PREVIEW_MAX_CHARS)
        .collect()
}

/// Split `/auth` arguments into the action and its remainder; no arguments
/// means `status`.
fn split_auth_action(args: &str) -> (String, &str) {
    match args.split_once(char::is_whitespace) {
        Some((action, rest)) => (action.to_lowercase(), rest.trim()),
        None if args.is_empty() => ("status".to_string(), ""),
        None => (args.to_lowercase(), ""),
    }
}

fn account_details(account: &Account) -> String {
    let mut details = Vec::new();
    if let Some(email) = &account.email {
        details.push(email.clone());
    }
    if let Some(plan) = &account.plan_type {
        details.push(format!("plan={plan}"));
    }
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join(", "))
    }
}
