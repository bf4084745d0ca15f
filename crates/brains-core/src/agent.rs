//! The agent sub-loop: repeated `generateText` calls interleaved with tool
//! execution, until a terminal tool resolves the block, a non-terminal tool
//! asks the run to wait on a webhook, or a configured limit is hit.

use std::future::Future;

use brains_llm::{GenerateTextRequest, LlmClient, Message};
use brains_types::{Event, SignalKind, SignalSource, WebhookRegistration};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};
use crate::graph::{AgentConfig, Tool, ToolOutcome};

/// How an agent block ended. `stream.rs` turns this into the block's
/// `StepOutcome` equivalent — `Complete` folds `result` into state, `Wait`
/// suspends the run the same way a step's `StepOutcome::Wait` does.
pub enum AgentOutcome {
    Complete {
        terminal_tool_name: String,
        result: Value,
        total_tokens: u64,
    },
    Wait {
        wait_for: Vec<WebhookRegistration>,
        total_tokens: u64,
    },
    /// The model stopped calling tools without ever resolving a terminal
    /// one (§4.3 step 5). No `AGENT_COMPLETE` is emitted and state is left
    /// untouched by the step that ran this loop.
    Idle { total_tokens: u64 },
    /// The iteration or token cap was hit before any terminal tool resolved
    /// (§4.3 step 7). Treated the same as `Idle` — a terminal outcome, not
    /// an error, so the enclosing block still reaches `STEP_COMPLETE`.
    LimitReached { total_tokens: u64 },
}

/// Fixed identity of the run/step this loop is emitting events for, and the
/// options value every event on this run carries verbatim.
pub struct AgentContext {
    pub run_id: String,
    pub step_id: String,
    pub options: Value,
}

fn find_tool<'a>(tools: &'a [Tool], name: &str) -> Option<&'a Tool> {
    tools.iter().find(|t| t.name == name)
}

/// Drive one agent sub-loop to completion or suspension.
///
/// `emit` is awaited on every call so a caller backed by a bounded channel
/// (as `stream.rs` is) keeps its backpressure guarantee even across agent
/// events — nothing here is allowed to fire-and-forget an event.
///
/// `messages` is the full conversation so far; on a cold start that's just
/// the user prompt, on resume it is reconstructed from the event log
/// (`resume.rs`) and already contains every prior assistant/tool turn, so
/// this function transparently continues where a prior process left off.
pub async fn run_agent<F, Fut>(
    ctx: &AgentContext,
    llm: &dyn LlmClient,
    config: AgentConfig,
    mut messages: Vec<Message>,
    signals: &mut dyn SignalSource,
    mut emit: F,
) -> Result<AgentOutcome>
where
    F: FnMut(Event) -> Fut,
    Fut: Future<Output = ()>,
{
    if !llm.supports_generate_text() {
        return Err(CoreError::Llm(brains_llm::LlmError::CapabilityMissing(
            "generate_text".into(),
        )));
    }

    let mut iteration: u32 = 0;
    let mut total_tokens: u64 = 0;
    let descriptors: Vec<_> = config.tools.iter().map(Tool::descriptor).collect();

    loop {
        // Safe point: a PAUSE/KILL is handled by the caller between blocks;
        // a USER_MESSAGE is only ever legal while this loop is in flight, so
        // it's drained here and folded into the conversation directly.
        while let Some(signal) = signals.try_recv() {
            if let SignalKind::UserMessage { content } = signal.kind {
                messages.push(Message::user(content));
            }
        }

        // §4.3 step 7: default 100 when the author left `maxIterations` unset.
        let max_iterations = config.max_iterations.unwrap_or(100);
        if iteration >= max_iterations {
            emit(Event::AgentIterationLimit {
                run_id: ctx.run_id.clone(),
                options: ctx.options.clone(),
                step_id: ctx.step_id.clone(),
                iteration,
                max_iterations,
                total_tokens,
                ts: Utc::now(),
            })
            .await;
            return Ok(AgentOutcome::LimitReached { total_tokens });
        }

        let response = llm
            .generate_text(GenerateTextRequest {
                messages: messages.clone(),
                system: config.system.clone(),
                tools: descriptors.clone(),
            })
            .await?;

        for raw in &response.response_messages {
            emit(Event::AgentRawResponseMessage {
                run_id: ctx.run_id.clone(),
                options: ctx.options.clone(),
                step_id: ctx.step_id.clone(),
                message: raw.clone(),
                ts: Utc::now(),
            })
            .await;
        }

        total_tokens += response.usage.total_tokens;
        iteration += 1;
        emit(Event::AgentIteration {
            run_id: ctx.run_id.clone(),
            options: ctx.options.clone(),
            step_id: ctx.step_id.clone(),
            iteration,
            tokens_this_iteration: response.usage.total_tokens,
            total_tokens,
            ts: Utc::now(),
        })
        .await;

        if let Some(max_tokens) = config.max_tokens {
            if total_tokens >= max_tokens {
                emit(Event::AgentTokenLimit {
                    run_id: ctx.run_id.clone(),
                    options: ctx.options.clone(),
                    step_id: ctx.step_id.clone(),
                    total_tokens,
                    max_tokens,
                    ts: Utc::now(),
                })
                .await;
                return Ok(AgentOutcome::LimitReached { total_tokens });
            }
        }

        if let Some(text) = &response.text {
            if !text.is_empty() {
                messages.push(Message::assistant(text.clone()));
            }
        }

        if response.tool_calls.is_empty() {
            if let Some(text) = &response.text {
                if !text.is_empty() {
                    emit(Event::AgentAssistantMessage {
                        run_id: ctx.run_id.clone(),
                        options: ctx.options.clone(),
                        step_id: ctx.step_id.clone(),
                        content: text.clone(),
                        ts: Utc::now(),
                    })
                    .await;
                }
            }
            // No tool calls: §4.3 step 5 ends the loop here without
            // AGENT_COMPLETE, leaving state unchanged.
            return Ok(AgentOutcome::Idle { total_tokens });
        }

        for call in &response.tool_calls {
            emit(Event::AgentToolCall {
                run_id: ctx.run_id.clone(),
                options: ctx.options.clone(),
                step_id: ctx.step_id.clone(),
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.args.clone(),
                ts: Utc::now(),
            })
            .await;

            let tool = find_tool(&config.tools, &call.tool_name).ok_or_else(|| CoreError::Tool {
                tool: call.tool_name.clone(),
                source: format!("no tool named '{}' was declared to the model", call.tool_name).into(),
            })?;

            if tool.terminal {
                return Ok(AgentOutcome::Complete {
                    terminal_tool_name: tool.name.clone(),
                    result: call.args.clone(),
                    total_tokens,
                });
            }

            let outcome = match &tool.execute {
                Some(execute) => execute(call.args.clone()).await?,
                None => ToolOutcome::result(json!(null)),
            };

            if let Some(wait_for) = outcome.wait_for {
                emit(Event::AgentWebhook {
                    run_id: ctx.run_id.clone(),
                    options: ctx.options.clone(),
                    step_id: ctx.step_id.clone(),
                    tool_call_id: call.tool_call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    input: call.args.clone(),
                    ts: Utc::now(),
                })
                .await;
                return Ok(AgentOutcome::Wait { wait_for, total_tokens });
            }

            let result = outcome.result.unwrap_or(Value::Null);
            emit(Event::AgentToolResult {
                run_id: ctx.run_id.clone(),
                options: ctx.options.clone(),
                step_id: ctx.step_id.clone(),
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                result: result.clone(),
                ts: Utc::now(),
            })
            .await;
            messages.push(Message::tool(
                call.tool_call_id.clone(),
                call.tool_name.clone(),
                result.to_string(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brains_llm::{GenerateObjectRequest, GenerateTextResponse, LlmError, ToolCall, Usage};
    use brains_types::NoSignals;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed script of `generate_text` responses, one per call.
    struct ScriptedClient {
        responses: Mutex<Vec<GenerateTextResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<GenerateTextResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn generate_text(
            &self,
            _request: GenerateTextRequest,
        ) -> brains_llm::Result<GenerateTextResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Provider("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }

        async fn generate_object(&self, _request: GenerateObjectRequest) -> brains_llm::Result<Value> {
            Ok(json!({}))
        }
    }

    fn ctx() -> AgentContext {
        AgentContext {
            run_id: "run-1".into(),
            step_id: "step-1".into(),
            options: json!({}),
        }
    }

    #[tokio::test]
    async fn terminal_tool_call_ends_the_loop() {
        let client = ScriptedClient::new(vec![GenerateTextResponse {
            text: None,
            tool_calls: vec![ToolCall {
                tool_call_id: "call-1".into(),
                tool_name: "finish".into(),
                args: json!({"answer": 42}),
            }],
            usage: Usage { total_tokens: 10 },
            response_messages: vec![],
        }]);

        let config = AgentConfig {
            prompt: "what is the answer?".into(),
            system: None,
            tools: vec![Tool::new("finish", "end the task", json!({})).terminal()],
            max_tokens: None,
            max_iterations: None,
            output_schema: None,
        };

        let mut events = Vec::new();
        let outcome = run_agent(
            &ctx(),
            &client,
            config,
            vec![Message::user("what is the answer?")],
            &mut NoSignals,
            |ev| {
                events.push(ev);
                std::future::ready(())
            },
        )
        .await
        .unwrap();

        match outcome {
            AgentOutcome::Complete { terminal_tool_name, result, total_tokens } => {
                assert_eq!(terminal_tool_name, "finish");
                assert_eq!(result, json!({"answer": 42}));
                assert_eq!(total_tokens, 10);
            }
            AgentOutcome::Wait { .. } => panic!("expected completion, got Wait"),
            AgentOutcome::Idle { .. } => panic!("expected completion, got Idle"),
            AgentOutcome::LimitReached { .. } => panic!("expected completion, got LimitReached"),
        }
        assert!(events.iter().any(|e| e.event_type() == "AGENT_TOOL_CALL"));
    }

    #[tokio::test]
    async fn non_terminal_tool_with_wait_for_suspends() {
        let client = ScriptedClient::new(vec![GenerateTextResponse {
            text: None,
            tool_calls: vec![ToolCall {
                tool_call_id: "call-1".into(),
                tool_name: "send_email".into(),
                args: json!({"to": "a@example.com"}),
            }],
            usage: Usage { total_tokens: 5 },
            response_messages: vec![],
        }]);

        let wait_tool = Tool::new("send_email", "send an email and wait for a reply", json!({}))
            .with_execute(|_args| {
                Box::pin(async move {
                    Ok(ToolOutcome::wait_for(vec![WebhookRegistration::new(
                        "email-reply",
                        "abc123",
                    )]))
                })
            });

        let config = AgentConfig {
            prompt: "email them".into(),
            system: None,
            tools: vec![wait_tool],
            max_tokens: None,
            max_iterations: None,
            output_schema: None,
        };

        let outcome = run_agent(
            &ctx(),
            &client,
            config,
            vec![Message::user("email them")],
            &mut NoSignals,
            |_ev| std::future::ready(()),
        )
        .await
        .unwrap();

        match outcome {
            AgentOutcome::Wait { wait_for, .. } => assert_eq!(wait_for.len(), 1),
            AgentOutcome::Complete { .. } => panic!("expected suspension, got Complete"),
            AgentOutcome::Idle { .. } => panic!("expected suspension, got Idle"),
            AgentOutcome::LimitReached { .. } => panic!("expected suspension, got LimitReached"),
        }
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_loop_with_an_event() {
        // A non-terminal tool the model keeps calling, so the loop is still
        // going when the iteration cap is checked on the next pass; a model
        // that stops calling tools would instead end via `AgentOutcome::Idle`
        // with no limit event at all.
        let client = ScriptedClient::new(vec![GenerateTextResponse {
            text: None,
            tool_calls: vec![ToolCall {
                tool_call_id: "call-1".into(),
                tool_name: "think".into(),
                args: json!({}),
            }],
            usage: Usage { total_tokens: 1 },
            response_messages: vec![],
        }]);

        let config = AgentConfig {
            prompt: "loop forever".into(),
            system: None,
            tools: vec![Tool::new("think", "ponder", json!({}))
                .with_execute(|_args| Box::pin(async move { Ok(ToolOutcome::result(json!("ok"))) }))],
            max_tokens: None,
            max_iterations: Some(1),
            output_schema: None,
        };

        let mut events = Vec::new();
        let outcome = run_agent(
            &ctx(),
            &client,
            config,
            vec![Message::user("loop forever")],
            &mut NoSignals,
            |ev| {
                events.push(ev);
                std::future::ready(())
            },
        )
        .await
        .unwrap();

        assert!(matches!(outcome, AgentOutcome::LimitReached { total_tokens: 1 }));
        assert!(events.iter().any(|e| e.event_type() == "AGENT_ITERATION_LIMIT"));
    }

    #[tokio::test]
    async fn unset_max_iterations_defaults_to_one_hundred() {
        // A scripted client with 100 identical non-terminal responses: the
        // default cap (§4.3 step 7) must stop the loop on the 100th without
        // the author ever setting `maxIterations`.
        let responses = (0..100)
            .map(|_| GenerateTextResponse {
                text: None,
                tool_calls: vec![ToolCall {
                    tool_call_id: "call-1".into(),
                    tool_name: "think".into(),
                    args: json!({}),
                }],
                usage: Usage { total_tokens: 1 },
                response_messages: vec![],
            })
            .collect();
        let client = ScriptedClient::new(responses);

        let config = AgentConfig {
            prompt: "loop forever".into(),
            system: None,
            tools: vec![Tool::new("think", "ponder", json!({}))
                .with_execute(|_args| Box::pin(async move { Ok(ToolOutcome::result(json!("ok"))) }))],
            max_tokens: None,
            max_iterations: None,
            output_schema: None,
        };

        let outcome = run_agent(
            &ctx(),
            &client,
            config,
            vec![Message::user("loop forever")],
            &mut NoSignals,
            |_ev| std::future::ready(()),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, AgentOutcome::LimitReached { total_tokens: 100 }));
    }
}
