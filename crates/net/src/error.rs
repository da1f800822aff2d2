//! Network error types

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Client and protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Not connected")]
    NotConnected,
}
