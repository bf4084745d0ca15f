//! The event model: the sole durable representation of a run.
//!
//! Every event carries a common envelope — `type`, `run_id`, `options` — plus
//! per-type fields (§3 of the runtime's design). Events are never mutated once
//! appended; a reader that observes a mutation or a gap has found a storage bug,
//! not a modeling one.

use chrono::{DateTime, Utc};
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::StepRecord;
use crate::tool::ToolDescriptor;
use crate::webhook::WebhookRegistration;

/// `{name, message, stack?}`, serialized by value. Stacks are advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl EventError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// The closed event set a run's log is built from. Consumers of the log
/// (replay, history, watch) MUST tolerate unknown fields on older events —
/// `#[serde(default)]` and `Option` are used liberally below for that reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "START")]
    Start {
        run_id: String,
        options: Value,
        initial_state: Value,
        ts: DateTime<Utc>,
    },
    /// Same role as `START`; emitted instead of it iff the run has at least one
    /// persisted completed step when the stream begins.
    #[serde(rename = "RESTART")]
    Restart {
        run_id: String,
        options: Value,
        initial_state: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "COMPLETE")]
    Complete {
        run_id: String,
        options: Value,
        final_state: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "ERROR")]
    Error {
        run_id: String,
        options: Value,
        error: EventError,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "PAUSED")]
    Paused {
        run_id: String,
        options: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "RESUMED")]
    Resumed {
        run_id: String,
        options: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "KILLED")]
    Killed {
        run_id: String,
        options: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "WEBHOOK")]
    Webhook {
        run_id: String,
        options: Value,
        wait_for: Vec<WebhookRegistration>,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "WEBHOOK_RESPONSE")]
    WebhookResponse {
        run_id: String,
        options: Value,
        slug: String,
        identifier: String,
        response: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        run_id: String,
        options: Value,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "STEP_STATUS")]
    StepStatus {
        run_id: String,
        options: Value,
        steps: Vec<StepRecord>,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "STEP_START")]
    StepStart {
        run_id: String,
        options: Value,
        step_id: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "STEP_COMPLETE")]
    StepComplete {
        run_id: String,
        options: Value,
        step_id: String,
        patch: Patch,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "STEP_RETRY")]
    StepRetry {
        run_id: String,
        options: Value,
        step_id: String,
        error: EventError,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "AGENT_START")]
    AgentStart {
        run_id: String,
        options: Value,
        step_id: String,
        prompt: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        tools: Vec<ToolDescriptor>,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_ITERATION")]
    AgentIteration {
        run_id: String,
        options: Value,
        step_id: String,
        iteration: u32,
        tokens_this_iteration: u64,
        total_tokens: u64,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_RAW_RESPONSE_MESSAGE")]
    AgentRawResponseMessage {
        run_id: String,
        options: Value,
        step_id: String,
        message: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_ASSISTANT_MESSAGE")]
    AgentAssistantMessage {
        run_id: String,
        options: Value,
        step_id: String,
        content: String,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_TOOL_CALL")]
    AgentToolCall {
        run_id: String,
        options: Value,
        step_id: String,
        tool_call_id: String,
        tool_name: String,
        input: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_TOOL_RESULT")]
    AgentToolResult {
        run_id: String,
        options: Value,
        step_id: String,
        tool_call_id: String,
        tool_name: String,
        result: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_WEBHOOK")]
    AgentWebhook {
        run_id: String,
        options: Value,
        step_id: String,
        tool_call_id: String,
        tool_name: String,
        input: Value,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_COMPLETE")]
    AgentComplete {
        run_id: String,
        options: Value,
        step_id: String,
        terminal_tool_name: String,
        result: Value,
        total_tokens: u64,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_TOKEN_LIMIT")]
    AgentTokenLimit {
        run_id: String,
        options: Value,
        step_id: String,
        total_tokens: u64,
        max_tokens: u64,
        ts: DateTime<Utc>,
    },
    #[serde(rename = "AGENT_ITERATION_LIMIT")]
    AgentIterationLimit {
        run_id: String,
        options: Value,
        step_id: String,
        iteration: u32,
        max_iterations: u32,
        total_tokens: u64,
        ts: DateTime<Utc>,
    },
}

impl Event {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &str {
        macro_rules! run_id_of {
            ($($variant:ident),* $(,)?) => {
                match self {
                    $(Event::$variant { run_id, .. } => run_id,)*
                }
            };
        }
        run_id_of!(
            Start, Restart, Complete, Error, Paused, Resumed, Killed, Webhook,
            WebhookResponse, Heartbeat, StepStatus, StepStart, StepComplete, StepRetry,
            AgentStart, AgentIteration, AgentRawResponseMessage, AgentAssistantMessage,
            AgentToolCall, AgentToolResult, AgentWebhook, AgentComplete, AgentTokenLimit,
            AgentIterationLimit,
        )
    }

    /// The wire `type` tag, e.g. `"STEP_COMPLETE"`. Useful for logging without a
    /// round-trip through serde.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::Start { .. } => "START",
            Event::Restart { .. } => "RESTART",
            Event::Complete { .. } => "COMPLETE",
            Event::Error { .. } => "ERROR",
            Event::Paused { .. } => "PAUSED",
            Event::Resumed { .. } => "RESUMED",
            Event::Killed { .. } => "KILLED",
            Event::Webhook { .. } => "WEBHOOK",
            Event::WebhookResponse { .. } => "WEBHOOK_RESPONSE",
            Event::Heartbeat { .. } => "HEARTBEAT",
            Event::StepStatus { .. } => "STEP_STATUS",
            Event::StepStart { .. } => "STEP_START",
            Event::StepComplete { .. } => "STEP_COMPLETE",
            Event::StepRetry { .. } => "STEP_RETRY",
            Event::AgentStart { .. } => "AGENT_START",
            Event::AgentIteration { .. } => "AGENT_ITERATION",
            Event::AgentRawResponseMessage { .. } => "AGENT_RAW_RESPONSE_MESSAGE",
            Event::AgentAssistantMessage { .. } => "AGENT_ASSISTANT_MESSAGE",
            Event::AgentToolCall { .. } => "AGENT_TOOL_CALL",
            Event::AgentToolResult { .. } => "AGENT_TOOL_RESULT",
            Event::AgentWebhook { .. } => "AGENT_WEBHOOK",
            Event::AgentComplete { .. } => "AGENT_COMPLETE",
            Event::AgentTokenLimit { .. } => "AGENT_TOKEN_LIMIT",
            Event::AgentIterationLimit { .. } => "AGENT_ITERATION_LIMIT",
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        macro_rules! ts_of {
            ($($variant:ident),* $(,)?) => {
                match self {
                    $(Event::$variant { ts, .. } => *ts,)*
                }
            };
        }
        ts_of!(
            Start, Restart, Complete, Error, Paused, Resumed, Killed, Webhook,
            WebhookResponse, Heartbeat, StepStatus, StepStart, StepComplete, StepRetry,
            AgentStart, AgentIteration, AgentRawResponseMessage, AgentAssistantMessage,
            AgentToolCall, AgentToolResult, AgentWebhook, AgentComplete, AgentTokenLimit,
            AgentIterationLimit,
        )
    }

    /// `true` once this event has put the run into a state from which no more
    /// events may be appended (the terminal-quiescence invariant).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete { .. } | Event::Error { .. } | Event::Killed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_through_json() {
        let ev = Event::StepComplete {
            run_id: "r1".into(),
            options: json!({}),
            step_id: "s1".into(),
            patch: json_patch::diff(&json!({"count": 0}), &json!({"count": 1})),
            ts: Utc::now(),
        };
        let s = serde_json::to_string(&ev).unwrap();
        assert!(s.contains("\"type\":\"STEP_COMPLETE\""));
        let back: Event = serde_json::from_str(&s).unwrap();
        assert_eq!(back.run_id(), "r1");
        assert_eq!(back.event_type(), "STEP_COMPLETE");
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let raw = json!({
            "type": "HEARTBEAT",
            "run_id": "r1",
            "options": {},
            "ts": Utc::now(),
            "future_field": "ignored",
        });
        let ev: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(ev.event_type(), "HEARTBEAT");
    }

    #[test]
    fn terminal_events_are_flagged() {
        let ev = Event::Complete {
            run_id: "r1".into(),
            options: json!({}),
            final_state: json!({}),
            ts: Utc::now(),
        };
        assert!(ev.is_terminal());
    }
}
