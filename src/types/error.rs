use thiserror::Error;

/// cx-service error types
#[derive(Error, Debug)]
pub enum CxError {
    /// Network failure, timeout or non-2xx reply
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a shape we cannot read
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Handshake failed or the token was rejected
    #[error("auth error: {0}")]
    Auth(String),

    /// Bad or missing configuration input
    #[error("config error: {0}")]
    Config(String),

    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CxError::MalformedResponse(err.to_string())
        } else {
            CxError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CxError {
    fn from(err: serde_json::Error) -> Self {
        CxError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for cx-service
pub type Result<T> = std::result::Result<T, CxError>;
