use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("run not found: {0}")]
    NotFound(String),

    #[error("run {0} is terminal; no further events may be appended")]
    Terminal(String),

    #[error("concurrent append rejected: another owner holds run {0}")]
    OwnershipConflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;
