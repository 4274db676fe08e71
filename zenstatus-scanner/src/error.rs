use thiserror::Error;

/// Failure kinds surfaced by a [`Fetcher`](crate::fetch::Fetcher).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Timeouts and connection failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Connection(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Unparseable document: {0}")]
    UnparseableDocument(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Fetch error: {0}")]
    GenericFetch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for ScanError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout(msg) => ScanError::NetworkTimeout(msg),
            FetchError::Connection(msg) => ScanError::ConnectionFailure(msg),
            FetchError::Other(msg) => ScanError::GenericFetch(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
