//! Tool descriptors as they appear on the wire (in `AGENT_START` events and the
//! LLM client contract). The executable side of a tool — its `execute` closure —
//! lives in `brains-core`, which is the only crate that needs to run one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an agent block tells the LLM client about one callable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// A terminal tool ends the agent loop; its arguments become the result.
    #[serde(default)]
    pub terminal: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            terminal: false,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}
