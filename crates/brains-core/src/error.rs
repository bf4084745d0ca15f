use brains_types::EventError;
use thiserror::Error;

/// Errors raised while instantiating or executing a step graph. Anything that
/// reaches the top of a run as this error is translated into an `ERROR` event
/// and ends the run (§7's "author/contract errors" and "step failures").
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Llm(#[from] brains_llm::LlmError),

    #[error("step '{title}' failed: {source}")]
    Step { title: String, source: Box<dyn std::error::Error + Send + Sync> },

    #[error("agent tool '{tool}' execution failed: {source}")]
    Tool { tool: String, source: Box<dyn std::error::Error + Send + Sync> },

    #[error("graph construction error: {0}")]
    Validation(String),

    #[error("a brain titled '{0}' is already registered")]
    DuplicateBrainTitle(String),

    #[error(transparent)]
    Patch(#[from] brains_types::TypesError),
}

impl CoreError {
    /// Convert to the `{name, message, stack?}` shape carried on `ERROR`
    /// events. `message` is the underlying failure's own message, undecorated
    /// by this crate's wrapping context, so a step that throws
    /// `{name: "Error", message: "Test error"}` round-trips unchanged.
    pub fn to_event_error(&self) -> EventError {
        let message = match self {
            CoreError::Step { source, .. } => source.to_string(),
            CoreError::Tool { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        EventError::new("Error", message)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
