use thiserror::Error;

/// Errors surfaced by an `LlmClient`. These are author/contract errors in the
/// engine's error taxonomy: they end the enclosing run with `ERROR` rather
/// than retrying.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The client was asked for a capability (usually `generate_text`) it does
    /// not implement. Agent blocks MUST fail immediately on this, not retry.
    #[error("LLM client does not implement {0}")]
    CapabilityMissing(String),

    #[error("LLM provider error: {0}")]
    Provider(String),

    #[error("LLM response did not conform to the requested schema: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;
