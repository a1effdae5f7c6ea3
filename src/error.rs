use thiserror::Error;

/// Error taxonomy surfaced to request callbacks and to `Client` callers.
///
/// `ConnectTimeout` and `ReadTimeout` carry numeric codes (1 / 128) for
/// callers that want to match on them without string comparison.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connect {peer} timeout after {secs}s")]
    ConnectTimeout { peer: String, secs: u64 },

    #[error("read {peer} timeout after {secs}s")]
    ReadTimeout { peer: String, secs: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("connection closed before response completed")]
    ConnectionClosed,

    #[error("request is no longer writable")]
    RequestReused,

    #[error("tls error: {0}")]
    Tls(String),
}

impl ClientError {
    /// Numeric error code: 1 for connect timeout, 128 for read timeout.
    pub fn legacy_code(&self) -> Option<i32> {
        match self {
            ClientError::ConnectTimeout { .. } => Some(1),
            ClientError::ReadTimeout { .. } => Some(128),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
