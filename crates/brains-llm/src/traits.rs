//! The `LlmClient` trait: the seam application code fills in with its chosen
//! provider. Mirrors the two-method contract in the runtime's spec — a chat
//! completion call used by the agent sub-loop, and a schema-constrained call
//! used by plain steps that want a structured extraction without the tool-
//! calling machinery.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{GenerateObjectRequest, GenerateTextRequest, GenerateTextResponse};

/// Provider-agnostic LLM client. Implementations wrap a specific vendor API
/// (OpenAI, Anthropic, a local model server, ...); this crate ships none.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Drive one chat-completion call. The agent sub-loop (§4.3) calls this
    /// once per iteration; tool calls in the response drive the loop onward.
    async fn generate_text(&self, request: GenerateTextRequest) -> Result<GenerateTextResponse>;

    /// Request a single object conforming to a JSON schema, with no
    /// tool-calling round trip. Used by plain step blocks, not the agent loop.
    async fn generate_object(&self, request: GenerateObjectRequest) -> Result<Value>;

    /// Whether this client implements `generate_text`. An agent block whose
    /// client answers `false` here MUST fail with
    /// [`crate::error::LlmError::CapabilityMissing`] rather than attempting
    /// the call.
    fn supports_generate_text(&self) -> bool {
        true
    }
}
