/// Crate-wide result type for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Relay errors. The display strings of the three input variants are shown
/// to the user verbatim, so they are full sentences with remediation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid callback URL. Paste the full redirect URL from your browser.")]
    InvalidCallbackUrl,

    #[error("Callback URL is missing required auth parameters.")]
    MissingAuthParams,

    #[error("Stored callback destination is invalid. Run /auth login again.")]
    InvalidDestination,

    /// The local callback listener rejected the replayed request.
    #[error("callback replay rejected with status {status}")]
    RelayStatus { status: u16 },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
