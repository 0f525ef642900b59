use shared::error::ApiError;
use thiserror::Error;

/// Failure of a single remote call. Nothing in this crate retries on any variant.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failure: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("talk service rejected request (status {status}): {error}")]
    Rejected { status: u16, error: ApiError },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// The backend answered and refused, as opposed to never being reached.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RemoteError::Rejected { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RemoteError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        RemoteError::WebSocket(Box::new(value))
    }
}
