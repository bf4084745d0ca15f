//! Error types shared by the event model.

use thiserror::Error;

/// Errors that can arise while constructing or applying durable event data.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("failed to compute state patch: {0}")]
    Patch(String),

    #[error("failed to apply state patch: {0}")]
    PatchApply(String),

    #[error("invalid event payload: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;
