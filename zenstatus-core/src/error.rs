use thiserror::Error;

/// Caller-facing validation failures. Per-page failures are reported as
/// records, never through this type.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No URLs provided")]
    NoUrls,

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Audit task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
