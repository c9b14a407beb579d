/// Crate-wide result type for Codex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed Codex backend errors.
///
/// `ThreadNotFound` is the one recoverable condition: callers may provision
/// a fresh thread and retry. Everything else is unrecoverable from the
/// caller's point of view.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend no longer knows the thread (expired, deleted, or the
    /// app-server restarted without its state).
    #[error("thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    /// A request did not finish within its wall-clock budget.
    #[error("codex request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The app-server answered with a JSON-RPC error.
    #[error("codex rpc error: {message}")]
    Rpc { message: String },

    /// The app-server returned a result the client could not interpret.
    #[error("unexpected codex response: {message}")]
    UnexpectedResponse { message: String },

    /// The subprocess exited or closed its pipes.
    #[error("codex app-server connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }
}
