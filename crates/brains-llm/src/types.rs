//! Request/response shapes for the `generateText` / `generateObject` contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in the conversation an agent block drives. The resumption
/// algorithm (§4.4) reconstructs a `Vec<Message>` from the event log before
/// re-entering the sub-loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
        }
    }
}

/// A tool invocation the model asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// Token accounting for one `generate_text` call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct GenerateTextRequest {
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub tools: Vec<brains_types::ToolDescriptor>,
}

/// `generateText`'s result. `response_messages` carries every message the
/// client produced, in order, purely for the `AGENT_RAW_RESPONSE_MESSAGE`
/// audit trail — the engine never interprets its contents.
#[derive(Debug, Clone)]
pub struct GenerateTextResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    pub response_messages: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct GenerateObjectRequest {
    pub schema: Value,
    pub schema_name: String,
    pub prompt: String,
}
