/// Crate-wide result type for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chat(#[from] courier_chat::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The sidecar answered an outbound send with a non-success status.
    #[error("sidecar rejected send with status {status}")]
    SendRejected { status: u16 },
}
