/// Crate-wide result type for chat handling.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codex(#[from] courier_codex::Error),

    #[error(transparent)]
    Store(#[from] courier_sessions::Error),
}
