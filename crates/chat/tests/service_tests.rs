#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Chat service tests against a scriptable mock Codex backend.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use {
    courier_chat::ChatService,
    courier_codex::{
        Account, AccountInfo, CodexClient, Error as CodexError, LoginStart, Result as CodexResult,
        ThreadSummary, TurnResult,
    },
    courier_sessions::SessionStore,
};

#[derive(Default)]
struct MockCodex {
    /// Scripted `run_turn` outcomes, popped front first; empty means echo.
    turn_queue: Mutex<VecDeque<CodexResult<TurnResult>>>,
    turns: Mutex<Vec<(String, String)>>,
    started_titles: Mutex<Vec<Option<String>>>,
    thread_counter: AtomicUsize,
    listing: Mutex<Vec<ThreadSummary>>,
    listed_limits: Mutex<Vec<usize>>,
    resumed: Mutex<Vec<String>>,
    compacted: Mutex<Vec<String>>,
    account: Mutex<Option<Account>>,
    cancelled: Mutex<Vec<String>>,
    restarts: AtomicUsize,
}

impl MockCodex {
    fn push_turn(&self, result: CodexResult<TurnResult>) {
        self.turn_queue.lock().unwrap().push_back(result);
    }

    fn set_account(&self, account: Option<Account>) {
        *self.account.lock().unwrap() = account;
    }

    fn set_listing(&self, threads: Vec<ThreadSummary>) {
        *self.listing.lock().unwrap() = threads;
    }

    fn started_count(&self) -> usize {
        self.started_titles.lock().unwrap().len()
    }
}

fn turn_ok(text: &str) -> CodexResult<TurnResult> {
    Ok(TurnResult {
        text: text.to_string(),
        status: "completed".to_string(),
        blocked_item_type: None,
    })
}

fn thread(id: &str, preview: Option<&str>) -> ThreadSummary {
    ThreadSummary {
        id: id.to_string(),
        preview: preview.map(str::to_string),
    }
}

fn chatgpt_account() -> Account {
    Account {
        account_type: "chatgpt".to_string(),
        email: Some("user@example.com".to_string()),
        plan_type: Some("plus".to_string()),
    }
}

#[async_trait]
impl CodexClient for MockCodex {
    async fn thread_start(&self, title: Option<&str>) -> CodexResult<ThreadSummary> {
        self.started_titles
            .lock()
            .unwrap()
            .push(title.map(str::to_string));
        let n = self.thread_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(thread(&format!("thr_{n}"), None))
    }

    async fn thread_resume(&self, thread_id: &str) -> CodexResult<ThreadSummary> {
        self.resumed.lock().unwrap().push(thread_id.to_string());
        Ok(thread(thread_id, None))
    }

    async fn thread_list(&self, limit: usize) -> CodexResult<Vec<ThreadSummary>> {
        self.listed_limits.lock().unwrap().push(limit);
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn thread_compact_start(&self, thread_id: &str) -> CodexResult<()> {
        self.compacted.lock().unwrap().push(thread_id.to_string());
        Ok(())
    }

    async fn account_read(&self, _refresh_token: bool) -> CodexResult<AccountInfo> {
        Ok(AccountInfo {
            account: self.account.lock().unwrap().clone(),
        })
    }

    async fn account_login_start(&self) -> CodexResult<LoginStart> {
        Ok(LoginStart {
            login_id: "login_1".to_string(),
            auth_url: "https://auth.example/login?redirect_uri=http%3A%2F%2F127.0.0.1%3A1455%2Fauth%2Fcallback".to_string(),
        })
    }

    async fn account_login_cancel(&self, login_id: &str) -> CodexResult<()> {
        self.cancelled.lock().unwrap().push(login_id.to_string());
        Ok(())
    }

    async fn run_turn(
        &self,
        thread_id: &str,
        text: &str,
        _developer_instructions: &str,
    ) -> CodexResult<TurnResult> {
        self.turns
            .lock()
            .unwrap()
            .push((thread_id.to_string(), text.to_string()));
        match self.turn_queue.lock().unwrap().pop_front() {
            Some(result) => result,
            None => turn_ok(&format!("echo: {text}")),
        }
    }

    async fn restart(&self) -> CodexResult<()> {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

async fn test_store() -> SessionStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = SessionStore::with_pool(pool);
    store.migrate().await.unwrap();
    store
}

async fn service_with_mock() -> (ChatService, Arc<MockCodex>) {
    let store = test_store().await;
    let mock = Arc::new(MockCodex::default());
    let service = ChatService::new(store, Arc::clone(&mock) as Arc<dyn CodexClient>)
        .with_login_poll(Duration::ZERO, Duration::from_millis(1));
    (service, mock)
}

fn store_of(service: &ChatService) -> &SessionStore {
    service.store()
}

// ── turn routing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_text_creates_and_persists_thread() {
    let (service, mock) = service_with_mock().await;

    let response = service.handle_message("chat", "hello").await.unwrap();
    assert_eq!(response.text, "echo: hello");
    assert_eq!(
        store_of(&service)
            .thread_for_chat("chat")
            .await
            .unwrap()
            .as_deref(),
        Some("thr_1")
    );

    // The second message reuses the stored thread.
    service.handle_message("chat", "again").await.unwrap();
    assert_eq!(mock.started_count(), 1);
    let turns = mock.turns.lock().unwrap().clone();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].0, "thr_1");
}

#[tokio::test]
async fn thread_not_found_recovers_once() {
    let (service, mock) = service_with_mock().await;
    store_of(&service)
        .set_thread_for_chat("chat", "thr_stale")
        .await
        .unwrap();
    mock.push_turn(Err(CodexError::ThreadNotFound {
        thread_id: "thr_stale".to_string(),
    }));
    mock.push_turn(turn_ok("recovered"));

    let response = service.handle_message("chat", "hello").await.unwrap();
    assert_eq!(response.text, "recovered");
    // The fresh thread replaced the stale one.
    assert_eq!(
        store_of(&service)
            .thread_for_chat("chat")
            .await
            .unwrap()
            .as_deref(),
        Some("thr_1")
    );
    assert_eq!(mock.started_count(), 1);
}

#[tokio::test]
async fn second_thread_loss_reports_expired_session() {
    let (service, mock) = service_with_mock().await;
    store_of(&service)
        .set_thread_for_chat("chat", "thr_stale")
        .await
        .unwrap();
    for thread_id in ["thr_stale", "thr_1"] {
        mock.push_turn(Err(CodexError::ThreadNotFound {
            thread_id: thread_id.to_string(),
        }));
    }

    let response = service.handle_message("chat", "hello").await.unwrap();
    assert_eq!(
        response.text,
        "Session expired and could not be recovered. Send /new and try again."
    );
}

#[tokio::test]
async fn other_turn_errors_propagate() {
    let (service, mock) = service_with_mock().await;
    mock.push_turn(Err(CodexError::Rpc {
        message: "rate limited".to_string(),
    }));

    assert!(service.handle_message("chat", "hello").await.is_err());
    // No retry happened.
    assert_eq!(mock.turns.lock().unwrap().len(), 1);
}

// ── session commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn new_command_abandons_existing_thread() {
    let (service, mock) = service_with_mock().await;
    store_of(&service)
        .set_thread_for_chat("chat", "thr_old")
        .await
        .unwrap();

    let response = service
        .handle_message("chat", "/new research notes")
        .await
        .unwrap();
    assert_eq!(response.text, "Started new session: `thr_1`");
    assert_eq!(
        mock.started_titles.lock().unwrap().clone(),
        vec![Some("research notes".to_string())]
    );
    assert_eq!(
        store_of(&service)
            .thread_for_chat("chat")
            .await
            .unwrap()
            .as_deref(),
        Some("thr_1")
    );
}

#[tokio::test]
async fn sessions_lists_with_index_and_preview() {
    let (service, mock) = service_with_mock().await;
    mock.set_listing(vec![
        thread("thr_a", Some("first\nline")),
        thread("thr_b", None),
    ]);

    let response = service.handle_message("chat", "/sessions").await.unwrap();
    assert_eq!(response.text, "Sessions:\n1. `thr_a` — first line\n2. `thr_b`");
    assert_eq!(mock.listed_limits.lock().unwrap().clone(), vec![5]);
}

#[tokio::test]
async fn sessions_limit_is_clamped_and_defaulted() {
    let (service, mock) = service_with_mock().await;
    mock.set_listing(vec![thread("thr_a", None)]);

    service.handle_message("chat", "/sessions 50").await.unwrap();
    service.handle_message("chat", "/sessions abc").await.unwrap();
    service.handle_message("chat", "/sessions 0").await.unwrap();
    assert_eq!(mock.listed_limits.lock().unwrap().clone(), vec![20, 5, 5]);
}

#[tokio::test]
async fn sessions_reports_empty_listing() {
    let (service, _mock) = service_with_mock().await;
    let response = service.handle_message("chat", "/sessions").await.unwrap();
    assert_eq!(response.text, "No sessions found.");
}

#[tokio::test]
async fn resume_by_index_uses_listing_page() {
    let (service, mock) = service_with_mock().await;
    mock.set_listing(vec![thread("thr_a", None), thread("thr_b", None)]);

    let response = service.handle_message("chat", "/resume 2").await.unwrap();
    assert_eq!(response.text, "Resumed session: `thr_b`");
    assert_eq!(mock.listed_limits.lock().unwrap().clone(), vec![20]);
    assert_eq!(mock.resumed.lock().unwrap().clone(), vec!["thr_b"]);
    assert_eq!(
        store_of(&service)
            .thread_for_chat("chat")
            .await
            .unwrap()
            .as_deref(),
        Some("thr_b")
    );
}

#[tokio::test]
async fn resume_by_id_is_taken_literally() {
    let (service, mock) = service_with_mock().await;

    let response = service
        .handle_message("chat", "/resume thr_xyz")
        .await
        .unwrap();
    assert_eq!(response.text, "Resumed session: `thr_xyz`");
    assert_eq!(mock.resumed.lock().unwrap().clone(), vec!["thr_xyz"]);
}

#[tokio::test]
async fn resume_rejects_bad_indices() {
    let (service, mock) = service_with_mock().await;
    mock.set_listing(vec![thread("thr_a", None)]);

    let response = service.handle_message("chat", "/resume 0").await.unwrap();
    assert_eq!(response.text, "Index must be 1 or higher.");

    let response = service.handle_message("chat", "/resume 9").await.unwrap();
    assert_eq!(response.text, "Only 1 sessions available in this page.");

    let response = service.handle_message("chat", "/resume").await.unwrap();
    assert_eq!(response.text, "Usage: /resume <thread_id|index>");
    assert!(mock.resumed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn compact_requires_an_active_session() {
    let (service, mock) = service_with_mock().await;

    let response = service.handle_message("chat", "/compact").await.unwrap();
    assert_eq!(response.text, "No active session. Use /new first.");

    store_of(&service)
        .set_thread_for_chat("chat", "thr_1")
        .await
        .unwrap();
    let response = service.handle_message("chat", "/compact").await.unwrap();
    assert_eq!(response.text, "Compaction started for the active session.");
    assert_eq!(mock.compacted.lock().unwrap().clone(), vec!["thr_1"]);
}

#[tokio::test]
async fn help_and_unknown_commands() {
    let (service, _mock) = service_with_mock().await;

    let response = service.handle_message("chat", "/help").await.unwrap();
    assert!(response.text.contains("/resume <thread_id|index>"));

    let response = service.handle_message("chat", "/bogus").await.unwrap();
    assert_eq!(response.text, "Unknown command. Send /help.");
}

// ── auth sub-flow ───────────────────────────────────────────────────────────

#[tokio::test]
async fn auth_status_reports_account_details() {
    let (service, mock) = service_with_mock().await;

    let response = service.handle_message("chat", "/auth status").await.unwrap();
    assert_eq!(
        response.text,
        "Auth: not logged in. Run /auth login and try again."
    );

    mock.set_account(Some(chatgpt_account()));
    let response = service.handle_message("chat", "/auth").await.unwrap();
    assert_eq!(response.text, "Auth: chatgpt (user@example.com, plan=plus)");
}

#[tokio::test]
async fn auth_login_stores_pending_login() {
    let (service, _mock) = service_with_mock().await;

    let response = service.handle_message("chat", "/auth login").await.unwrap();
    assert!(response.text.contains("https://auth.example/login"));
    assert!(response.text.contains("/auth complete <full_url>"));

    let pending = store_of(&service).pending_login().await.unwrap().unwrap();
    assert_eq!(pending.login_id, "login_1");
    assert_eq!(
        pending.expected_redirect_uri.as_deref(),
        Some("http://127.0.0.1:1455/auth/callback")
    );
}

#[tokio::test]
async fn auth_complete_rejects_bad_callback_and_keeps_pending() {
    let (service, mock) = service_with_mock().await;
    service.handle_message("chat", "/auth login").await.unwrap();

    let response = service
        .handle_message("chat", "/auth complete http://localhost/auth/callback?foo=bar")
        .await
        .unwrap();
    assert_eq!(
        response.text,
        "Callback URL is missing required auth parameters."
    );
    assert!(store_of(&service).pending_login().await.unwrap().is_some());
    assert_eq!(mock.restarts.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn auth_complete_requires_pending_login() {
    let (service, _mock) = service_with_mock().await;

    let response = service
        .handle_message("chat", "/auth complete http://localhost/cb?code=a&state=b")
        .await
        .unwrap();
    assert_eq!(response.text, "No pending login found. Run /auth login first.");

    let response = service.handle_message("chat", "/auth complete").await.unwrap();
    assert_eq!(response.text, "Usage: /auth complete <full_url>");
}

#[tokio::test]
async fn auth_complete_relays_and_finishes_login() {
    let (service, mock) = service_with_mock().await;
    let mut server = mockito::Server::new_async().await;
    let relay = server
        .mock("GET", "/auth/callback")
        .match_query(mockito::Matcher::UrlEncoded("code".into(), "abc".into()))
        .with_status(302)
        .create_async()
        .await;

    store_of(&service)
        .set_pending_login(
            "login_1",
            Some("https://auth.example/login"),
            Some(&format!("{}/auth/callback", server.url())),
        )
        .await
        .unwrap();
    mock.set_account(Some(chatgpt_account()));

    let response = service
        .handle_message("chat", "/auth complete http://localhost/cb?code=abc&state=xyz")
        .await
        .unwrap();
    assert_eq!(
        response.text,
        "Sign-in completed: chatgpt (user@example.com, plan=plus)"
    );
    relay.assert_async().await;
    assert_eq!(mock.restarts.load(Ordering::Relaxed), 1);
    assert!(store_of(&service).pending_login().await.unwrap().is_none());
}

#[tokio::test]
async fn auth_complete_timeout_leaves_pending_for_retry() {
    let (service, mock) = service_with_mock().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/callback")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .create_async()
        .await;

    store_of(&service)
        .set_pending_login(
            "login_1",
            None,
            Some(&format!("{}/auth/callback", server.url())),
        )
        .await
        .unwrap();
    // No account ever appears.
    mock.set_account(None);

    let response = service
        .handle_message("chat", "/auth complete http://localhost/cb?code=abc&state=xyz")
        .await
        .unwrap();
    assert_eq!(
        response.text,
        "Callback relayed; auth may be delayed, run /auth status in 10-20s."
    );
    assert!(store_of(&service).pending_login().await.unwrap().is_some());
}

#[tokio::test]
async fn auth_complete_reports_relay_failure() {
    let (service, mock) = service_with_mock().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/auth/callback")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    store_of(&service)
        .set_pending_login(
            "login_1",
            None,
            Some(&format!("{}/auth/callback", server.url())),
        )
        .await
        .unwrap();

    let response = service
        .handle_message("chat", "/auth complete http://localhost/cb?code=abc&state=xyz")
        .await
        .unwrap();
    assert_eq!(
        response.text,
        "Could not complete login from that callback URL. Try /auth login again."
    );
    assert_eq!(mock.restarts.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn auth_cancel_clears_pending_login() {
    let (service, mock) = service_with_mock().await;
    service.handle_message("chat", "/auth login").await.unwrap();

    let response = service.handle_message("chat", "/auth cancel").await.unwrap();
    assert_eq!(response.text, "Cancelled login: login_1");
    assert_eq!(mock.cancelled.lock().unwrap().clone(), vec!["login_1"]);
    assert!(store_of(&service).pending_login().await.unwrap().is_none());
}

#[tokio::test]
async fn auth_cancel_accepts_explicit_login_id() {
    let (service, mock) = service_with_mock().await;

    let response = service
        .handle_message("chat", "/auth cancel login_42")
        .await
        .unwrap();
    assert_eq!(response.text, "Cancelled login: login_42");
    assert_eq!(mock.cancelled.lock().unwrap().clone(), vec!["login_42"]);
}

#[tokio::test]
async fn auth_cancel_without_pending_reports_none() {
    let (service, _mock) = service_with_mock().await;
    let response = service.handle_message("chat", "/auth cancel").await.unwrap();
    assert_eq!(response.text, "No pending login id found. Use /auth login first.");
}

#[tokio::test]
async fn auth_apikey_is_disabled() {
    let (service, _mock) = service_with_mock().await;
    let response = service.handle_message("chat", "/auth apikey").await.unwrap();
    assert_eq!(
        response.text,
        "API key via WhatsApp is disabled. Use OPENAI_API_KEY env var."
    );
}

#[tokio::test]
async fn auth_unknown_action_shows_usage() {
    let (service, _mock) = service_with_mock().await;
    let response = service.handle_message("chat", "/auth frobnicate").await.unwrap();
    assert_eq!(
        response.text,
        "Usage: /auth status|login|complete|cancel [login_id]"
    );
}
