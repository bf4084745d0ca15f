//! LLM client trait contract consumed by the brains agent sub-loop.
//!
//! This crate is deliberately thin: it defines `generateText`/`generateObject`
//! per the runtime's external-interface spec and nothing else. Provider
//! adapters (OpenAI, Anthropic, local models, ...) live outside this repo.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{LlmError, Result};
pub use traits::LlmClient;
pub use types::{
    GenerateObjectRequest, GenerateTextRequest, GenerateTextResponse, Message, MessageRole,
    ToolCall, Usage,
};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct NoTextClient;

    #[async_trait]
    impl LlmClient for NoTextClient {
        async fn generate_text(&self, _request: GenerateTextRequest) -> Result<GenerateTextResponse> {
            Err(LlmError::CapabilityMissing("generate_text".into()))
        }

        async fn generate_object(&self, _request: GenerateObjectRequest) -> Result<Value> {
            Ok(json!({}))
        }

        fn supports_generate_text(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn capability_missing_is_distinguishable() {
        let client = NoTextClient;
        assert!(!client.supports_generate_text());
        let err = client
            .generate_text(GenerateTextRequest {
                messages: vec![Message::user("hi")],
                system: None,
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::CapabilityMissing(_)));
    }
}
