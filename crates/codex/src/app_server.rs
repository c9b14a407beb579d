//! `codex app-server` subprocess client.
//!
//! Spawns the app-server binary and speaks newline-delimited JSON-RPC over
//! its stdio: requests carry an `id`, notifications don't, and the server
//! may issue its own requests (approval prompts), which are auto-declined
//! per the research-only policy.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        process::{Child, ChildStdin, ChildStdout, Command},
        sync::{Mutex, broadcast, oneshot},
    },
    tracing::{debug, info, warn},
};

use crate::{
    client::{AccountInfo, CodexClient, LoginStart, ThreadSummary, TurnResult, turn_result_from},
    error::{Error, Result},
    policy::{EventAction, review_completed_item, should_auto_decline_server_request},
};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const TURN_TIMEOUT: Duration = Duration::from_secs(240);
const EVENT_BUFFER: usize = 256;

/// Configuration for the app-server subprocess.
#[derive(Debug, Clone)]
pub struct AppServerConfig {
    /// Executable to spawn (`codex`).
    pub bin: String,
    /// Client name announced in the initialize handshake.
    pub client_name: String,
    /// Model requested for threads and turns.
    pub model: String,
    /// Working directory for the subprocess and its threads.
    pub cwd: Option<PathBuf>,
}

type RpcReply = Result<Value>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>>;

struct Connection {
    child: Child,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    events: broadcast::Sender<Value>,
}

impl Connection {
    fn handles(&self) -> ConnectionHandles {
        ConnectionHandles {
            stdin: Arc::clone(&self.stdin),
            pending: Arc::clone(&self.pending),
            events: self.events.clone(),
        }
    }
}

#[derive(Clone)]
struct ConnectionHandles {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    events: broadcast::Sender<Value>,
}

/// JSON-RPC client for a managed `codex app-server` subprocess.
pub struct AppServerClient {
    config: AppServerConfig,
    next_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl AppServerClient {
    pub fn new(config: AppServerConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    /// Spawn the subprocess if it is not already running.
    pub async fn start(&self) -> Result<()> {
        self.ensure_connection().await.map(|_| ())
    }

    async fn ensure_connection(&self) -> Result<ConnectionHandles> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_mut() {
            if conn.child.try_wait()?.is_none() {
                return Ok(conn.handles());
            }
            warn!("codex app-server exited, respawning");
            *guard = None;
        }

        let conn = self.spawn().await?;
        let handles = conn.handles();
        *guard = Some(conn);
        Ok(handles)
    }

    async fn spawn(&self) -> Result<Connection> {
        let mut command = Command::new(&self.config.bin);
        command
            .arg("app-server")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(Error::ConnectionClosed)?;
        let stdout = child.stdout.take().ok_or(Error::ConnectionClosed)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "codex_stderr", "{line}");
                }
            });
        }

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        tokio::spawn(read_loop(
            stdout,
            Arc::clone(&stdin),
            Arc::clone(&pending),
            events.clone(),
        ));

        let conn = Connection {
            child,
            stdin,
            pending,
            events,
        };

        let params = json!({
            "clientInfo": {
                "name": self.config.client_name,
                "title": "Codex WhatsApp Agent",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "experimentalApi": true,
        });
        self.request_on(&conn.handles(), "initialize", params, RPC_TIMEOUT)
            .await?;
        info!(bin = %self.config.bin, "codex app-server started");

        Ok(conn)
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let handles = self.ensure_connection().await?;
        self.request_on(&handles, method, params, timeout).await
    }

    async fn request_on(
        &self,
        handles: &ConnectionHandles,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        handles.pending.lock().await.insert(id, tx);

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(error) = write_line(&handles.stdin, &message).await {
            handles.pending.lock().await.remove(&id);
            return Err(error);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                handles.pending.lock().await.remove(&id);
                Err(Error::Timeout {
                    seconds: timeout.as_secs(),
                })
            },
        }
    }

    fn thread_from(result: &Value) -> Result<ThreadSummary> {
        let thread = result
            .get("thread")
            .cloned()
            .ok_or_else(|| Error::unexpected("missing thread in response"))?;
        Ok(serde_json::from_value(thread)?)
    }
}

#[async_trait]
impl CodexClient for AppServerClient {
    async fn thread_start(&self, title: Option<&str>) -> Result<ThreadSummary> {
        let params = json!({
            "model": self.config.model,
            "approvalPolicy": "never",
            "cwd": self.config.cwd,
        });
        let result = self.request("thread/start", params, RPC_TIMEOUT).await?;
        let thread = Self::thread_from(&result)?;

        if let Some(title) = title {
            let params = json!({"threadId": thread.id, "name": title});
            if let Err(error) = self.request("thread/setName", params, RPC_TIMEOUT).await {
                warn!(error = %error, "failed to set thread name");
            }
        }

        Ok(thread)
    }

    async fn thread_resume(&self, thread_id: &str) -> Result<ThreadSummary> {
        let params = json!({"threadId": thread_id, "approvalPolicy": "never"});
        let result = self
            .request("thread/resume", params, RPC_TIMEOUT)
            .await
            .map_err(|error| map_thread_not_found(error, thread_id))?;
        Self::thread_from(&result)
    }

    async fn thread_list(&self, limit: usize) -> Result<Vec<ThreadSummary>> {
        let params = json!({"cursor": null, "limit": limit, "sortKey": "updated_at"});
        let result = self.request("thread/list", params, RPC_TIMEOUT).await?;
        let data = result
            .get("data")
            .cloned()
            .ok_or_else(|| Error::unexpected("missing data in thread list"))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn thread_compact_start(&self, thread_id: &str) -> Result<()> {
        let params = json!({"threadId": thread_id});
        self.request("thread/compact/start", params, RPC_TIMEOUT)
            .await
            .map_err(|error| map_thread_not_found(error, thread_id))?;
        Ok(())
    }

    async fn account_read(&self, refresh_token: bool) -> Result<AccountInfo> {
        let params = json!({"refreshToken": refresh_token});
        let result = self.request("account/read", params, RPC_TIMEOUT).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn account_login_start(&self) -> Result<LoginStart> {
        let result = self
            .request("account/login/start", json!({"type": "chatgpt"}), RPC_TIMEOUT)
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn account_login_cancel(&self, login_id: &str) -> Result<()> {
        self.request(
            "account/login/cancel",
            json!({"loginId": login_id}),
            RPC_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn run_turn(
        &self,
        thread_id: &str,
        text: &str,
        developer_instructions: &str,
    ) -> Result<TurnResult> {
        let handles = self.ensure_connection().await?;
        let mut events = handles.events.subscribe();

        let params = json!({
            "threadId": thread_id,
            "input": text,
            "model": self.config.model,
            "developerInstructions": developer_instructions,
            "approvalPolicy": "never",
            "sandboxPolicy": "read-only",
        });
        let request = self.request_on(&handles, "turn/run", params, TURN_TIMEOUT);
        tokio::pin!(request);

        let mut blocked_item_type: Option<String> = None;
        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                event = events.recv() => {
                    let Ok(event) = event else { continue };
                    if let Some(item_type) = completed_item_type(&event, thread_id)
                        && blocked_item_type.is_none()
                        && review_completed_item(item_type) == EventAction::Interrupt
                    {
                        info!(item_type, "interrupting turn on disallowed item");
                        blocked_item_type = Some(item_type.to_string());
                        let params = json!({"threadId": thread_id});
                        if let Err(error) = self
                            .request_on(&handles, "turn/interrupt", params, RPC_TIMEOUT)
                            .await
                        {
                            warn!(error = %error, "failed to interrupt turn");
                        }
                    }
                },
            }
        };

        let result = result.map_err(|error| map_thread_not_found(error, thread_id))?;
        let status = result
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("completed")
            .to_string();
        let final_response = result
            .get("finalResponse")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(turn_result_from(status, final_response, blocked_item_type))
    }

    async fn restart(&self) -> Result<()> {
        let mut guard = self.connection.lock().await;
        if let Some(mut conn) = guard.take() {
            info!("stopping codex app-server for restart");
            let _ = conn.child.kill().await;
        }
        *guard = Some(self.spawn().await?);
        Ok(())
    }
}

/// The app-server reports thread loss only through its error text; translate
/// it into the typed variant at this boundary so no caller string-matches.
fn map_thread_not_found(error: Error, thread_id: &str) -> Error {
    match error {
        Error::Rpc { ref message } if message.to_lowercase().contains("thread not found") => {
            Error::ThreadNotFound {
                thread_id: thread_id.to_string(),
            }
        },
        other => other,
    }
}

/// Pull the completed-item type out of a `thread/event` notification for the
/// given thread, if that is what the message is.
fn completed_item_type<'a>(message: &'a Value, thread_id: &str) -> Option<&'a str> {
    if message.get("method").and_then(Value::as_str) != Some("thread/event") {
        return None;
    }
    let params = message.get("params")?;
    if params.get("threadId").and_then(Value::as_str) != Some(thread_id) {
        return None;
    }
    let event = params.get("event")?;
    if event.get("type").and_then(Value::as_str) != Some("item/completed") {
        return None;
    }
    event.get("item")?.get("type").and_then(Value::as_str)
}

async fn write_line(stdin: &Arc<Mutex<ChildStdin>>, message: &Value) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    let mut stdin = stdin.lock().await;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn read_loop(
    stdout: ChildStdout,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    events: broadcast::Sender<Value>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(message) => dispatch_message(message, &stdin, &pending, &events).await,
                    Err(error) => {
                        warn!(error = %error, "skipping malformed app-server line");
                    },
                }
            },
            Ok(None) => break,
            Err(error) => {
                warn!(error = %error, "app-server stdout read failed");
                break;
            },
        }
    }

    // Fail everything still in flight so callers don't hang on the timeout.
    let mut pending = pending.lock().await;
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(Error::ConnectionClosed));
    }
}

async fn dispatch_message(
    message: Value,
    stdin: &Arc<Mutex<ChildStdin>>,
    pending: &PendingMap,
    events: &broadcast::Sender<Value>,
) {
    let id = message.get("id").and_then(Value::as_u64);
    let method = message.get("method").and_then(Value::as_str);

    match (id, method) {
        // Server → client request.
        (Some(id), Some(method)) => {
            let reply = if should_auto_decline_server_request(method) {
                debug!(method, "auto-declining approval request");
                json!({"jsonrpc": "2.0", "id": id, "result": {"decision": "denied"}})
            } else {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": format!("unsupported server request: {method}")},
                })
            };
            if let Err(error) = write_line(stdin, &reply).await {
                warn!(error = %error, "failed to answer server request");
            }
        },
        // Response to one of our requests.
        (Some(id), None) => {
            let reply = if let Some(error) = message.get("error") {
                let text = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Err(Error::rpc(text))
            } else {
                Ok(message.get("result").cloned().unwrap_or(Value::Null))
            };
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(reply);
                },
                None => warn!(id, "response for unknown request id"),
            }
        },
        // Notification.
        (None, Some(_)) => {
            let _ = events.send(message);
        },
        (None, None) => warn!("app-server message with neither id nor method"),
    }
}
