//! Resumption: rebuilding state, the block cursor stack, and any in-flight
//! agent conversation from a run's persisted event log, per §4.4's three-part
//! algorithm. Nothing here re-runs a single action; it only produces the
//! inputs the event stream needs to pick up where a prior process left off.

use brains_llm::Message;
use brains_types::{empty_state, fold_patches, Event, State};
use serde_json::Value;

use crate::error::Result;
use crate::graph::{block_id, Brain};

/// A conversation suspended on an outstanding webhook. Reconstructed only
/// when the most recent agent activity for `step_id` ended in `AGENT_WEBHOOK`
/// with no later `AGENT_COMPLETE`/limit event resolving it.
pub struct PendingAgent {
    pub step_id: String,
    pub messages: Vec<Message>,
    pub pending_tool_call_id: String,
    pub pending_tool_name: String,
}

/// Everything the event stream needs to continue a run: the folded state,
/// the top-level block index to resume at, and a suspended agent
/// conversation if one is waiting.
pub struct ResumeContext {
    pub state: State,
    pub start_index: usize,
    pub pending_agent: Option<PendingAgent>,
}

/// Fold every `STEP_COMPLETE.patch` over `∅` in log order (§4.4 step 1).
/// An explicit initial-state override, if the run was started with one, is
/// folded in ahead of the patches so it behaves exactly like the pre-state a
/// freshly started run would have had.
pub fn reconstruct_state(events: &[Event], initial_override: Option<State>) -> Result<State> {
    let base = initial_override.unwrap_or_else(empty_state);
    let patches: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::StepComplete { patch, .. } => Some(patch.clone()),
            _ => None,
        })
        .collect();
    Ok(fold_patches(base, &patches)?)
}

/// Walk the log tracking, at each nesting depth, how many blocks at that
/// depth have completed (§4.4 step 2). A `START`/`RESTART` after the first
/// pushes a frame for a nested brain; a `COMPLETE` while nested pops back to
/// the parent frame and advances its counter, since the nested brain's own
/// block is now done from the parent's point of view.
pub fn reconstruct_stack(events: &[Event]) -> Vec<usize> {
    let mut stack = vec![0usize];
    let mut seen_start = false;
    for event in events {
        match event {
            Event::Start { .. } | Event::Restart { .. } => {
                if seen_start {
                    stack.push(0);
                } else {
                    seen_start = true;
                }
            }
            Event::StepComplete { .. } => {
                if let Some(top) = stack.last_mut() {
                    *top += 1;
                }
            }
            Event::Complete { .. } => {
                if stack.len() > 1 {
                    stack.pop();
                    if let Some(top) = stack.last_mut() {
                        *top += 1;
                    }
                }
            }
            _ => {}
        }
    }
    stack
}

fn prompt_to_content(prompt: &Value) -> String {
    match prompt.as_str() {
        Some(s) => s.to_string(),
        None => prompt.to_string(),
    }
}

/// Reconstruct the in-flight conversation for `step_id`, if its most recent
/// agent activity left it suspended on a webhook (§4.4 step 3). Returns
/// `None` if the step never ran an agent, or if its agent loop already
/// reached a terminal outcome.
pub fn reconstruct_pending_agent(events: &[Event], step_id: &str) -> Option<PendingAgent> {
    let start_index = events.iter().position(|e| {
        matches!(e, Event::AgentStart { step_id: sid, .. } if sid == step_id)
    })?;

    let mut messages = Vec::new();
    if let Event::AgentStart { prompt, .. } = &events[start_index] {
        messages.push(Message::user(prompt_to_content(prompt)));
    }

    let mut pending: Option<(String, String)> = None;
    for event in &events[start_index + 1..] {
        match event {
            Event::AgentAssistantMessage { step_id: sid, content, .. } if sid == step_id => {
                messages.push(Message::assistant(content.clone()));
            }
            Event::AgentToolResult {
                step_id: sid,
                tool_call_id,
                tool_name,
                result,
                ..
            } if sid == step_id => {
                messages.push(Message::tool(tool_call_id.clone(), tool_name.clone(), result.to_string()));
            }
            Event::AgentWebhook {
                step_id: sid,
                tool_call_id,
                tool_name,
                ..
            } if sid == step_id => {
                pending = Some((tool_call_id.clone(), tool_name.clone()));
            }
            Event::AgentComplete { step_id: sid, .. } if sid == step_id => pending = None,
            Event::AgentTokenLimit { step_id: sid, .. } if sid == step_id => pending = None,
            Event::AgentIterationLimit { step_id: sid, .. } if sid == step_id => pending = None,
            _ => {}
        }
    }

    pending.map(|(tool_call_id, tool_name)| PendingAgent {
        step_id: step_id.to_string(),
        messages,
        pending_tool_call_id: tool_call_id,
        pending_tool_name: tool_name,
    })
}

/// Run the full §4.4 algorithm: fold state, walk the log to find the
/// top-level block to resume at, and reconstruct any in-flight agent
/// conversation for that block. The single entry point `stream.rs` uses to
/// turn a prior event log back into a place to continue from.
pub fn reconstruct(events: &[Event], brain: &Brain, initial_override: Option<State>) -> Result<ResumeContext> {
    let state = reconstruct_state(events, initial_override)?;
    let stack = reconstruct_stack(events);
    let start_index = stack.first().copied().unwrap_or(0);
    let active_id = brain
        .blocks
        .get(start_index)
        .map(|b| block_id(&brain.title, start_index, b.title()));
    let pending_agent = active_id.as_deref().and_then(|id| reconstruct_pending_agent(events, id));
    Ok(ResumeContext {
        state,
        start_index,
        pending_agent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn step_complete(step_id: &str, patch: json_patch::Patch) -> Event {
        Event::StepComplete {
            run_id: "r1".into(),
            options: json!({}),
            step_id: step_id.into(),
            patch,
            ts: Utc::now(),
        }
    }

    #[test]
    fn state_folds_patches_in_order() {
        let events = vec![
            step_complete("s1", json_patch::diff(&json!({}), &json!({"count": 1}))),
            step_complete("s2", json_patch::diff(&json!({"count": 1}), &json!({"count": 2}))),
        ];
        let state = reconstruct_state(&events, None).unwrap();
        assert_eq!(state, json!({"count": 2}));
    }

    #[test]
    fn stack_tracks_top_level_completions() {
        let events = vec![
            Event::Start {
                run_id: "r1".into(),
                options: json!({}),
                initial_state: json!({}),
                ts: Utc::now(),
            },
            step_complete("s1", json_patch::diff(&json!({}), &json!({"a": 1}))),
            step_complete("s2", json_patch::diff(&json!({"a": 1}), &json!({"a": 2}))),
        ];
        assert_eq!(reconstruct_stack(&events), vec![2]);
    }

    #[test]
    fn pending_agent_requires_unresolved_webhook() {
        let events = vec![
            Event::AgentStart {
                run_id: "r1".into(),
                options: json!({}),
                step_id: "agent-1".into(),
                prompt: json!("help the customer"),
                system: None,
                tools: vec![],
                ts: Utc::now(),
            },
            Event::AgentWebhook {
                run_id: "r1".into(),
                options: json!({}),
                step_id: "agent-1".into(),
                tool_call_id: "call-1".into(),
                tool_name: "escalate".into(),
                input: json!({}),
                ts: Utc::now(),
            },
        ];
        let pending = reconstruct_pending_agent(&events, "agent-1").unwrap();
        assert_eq!(pending.pending_tool_name, "escalate");
        assert_eq!(pending.messages.len(), 1);
    }

    #[test]
    fn resolved_agent_is_not_pending() {
        let events = vec![
            Event::AgentStart {
                run_id: "r1".into(),
                options: json!({}),
                step_id: "agent-1".into(),
                prompt: json!("help"),
                system: None,
                tools: vec![],
                ts: Utc::now(),
            },
            Event::AgentComplete {
                run_id: "r1".into(),
                options: json!({}),
                step_id: "agent-1".into(),
                terminal_tool_name: "resolve".into(),
                result: json!({}),
                total_tokens: 10,
                ts: Utc::now(),
            },
        ];
        assert!(reconstruct_pending_agent(&events, "agent-1").is_none());
    }
}
