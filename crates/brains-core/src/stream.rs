//! The event stream: given a step graph and run parameters, drives block
//! execution and turns every state change into an [`Event`] before it is
//! observable anywhere else. This is the only place blocks actually run.

use std::sync::Arc;

use brains_llm::LlmClient;
use brains_types::{
    diff_state, Event, EventError, SignalKind, SignalSource, State, StepKind, StepRecord,
    StepStatus, WebhookRegistration,
};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::{run_agent, AgentContext, AgentOutcome};
use crate::batch;
use crate::error::{CoreError, Result};
use crate::graph::{block_id, AgentConfigInput, Block, Brain, StepInput, StepOutcome};
use crate::resume::{self, PendingAgent};

/// What calling code (the supervisor) should do once the stream stops
/// yielding events.
pub enum StreamOutcome {
    Complete { final_state: State },
    Waiting { wait_for: Vec<WebhookRegistration>, state: State },
    Paused { state: State },
    Killed { state: State },
    Error { error: EventError, state: State },
}

pub struct EventStream {
    pub events: ReceiverStream<Event>,
    pub outcome: oneshot::Receiver<StreamOutcome>,
}

/// Prior context recovered by [`crate::resume`], handed to [`run_stream`] so
/// it emits `RESTART` instead of `START` and continues from the right block.
pub struct ResumeInput {
    pub prior_events: Vec<Event>,
    /// Payload for the webhook that unblocked this resume, if any. Delivered
    /// as `response` to a plain step, or appended as a synthetic tool
    /// message if the awaited registration belonged to an agent.
    pub webhook_payload: Option<Value>,
}

pub struct StreamParams {
    pub run_id: String,
    pub options: Value,
    pub initial_state: State,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub resume: Option<ResumeInput>,
}

struct Emitter {
    tx: mpsc::Sender<Event>,
}

impl Emitter {
    async fn send(&self, event: Event) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

enum Signal1 {
    Continue,
    Pause,
    Kill,
}

fn check_safe_point(signals: &mut dyn SignalSource) -> (Signal1, Vec<SignalKind>) {
    let mut leftover = Vec::new();
    let mut result = Signal1::Continue;
    while let Some(signal) = signals.try_recv() {
        match signal.kind {
            SignalKind::Pause => result = Signal1::Pause,
            SignalKind::Kill => result = Signal1::Kill,
            other => leftover.push(other),
        }
    }
    (result, leftover)
}

/// Start (or resume) a brain's event stream. Returns immediately with a
/// [`Stream`](tokio_stream::Stream) of events and a one-shot outcome; the
/// caller is expected to consume events promptly since the channel has
/// capacity 1 and the producer task blocks on `send` until it does
/// (backpressure-preserving, per §4.2's contract).
pub fn run_stream(brain: Arc<Brain>, params: StreamParams, mut signals: Box<dyn SignalSource>) -> EventStream {
    let (tx, rx) = mpsc::channel(1);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    tokio::spawn(async move {
        let emitter = Emitter { tx };
        let outcome = drive(&brain, params, &mut *signals, &emitter).await;
        let _ = outcome_tx.send(outcome);
    });

    EventStream {
        events: ReceiverStream::new(rx),
        outcome: outcome_rx,
    }
}

async fn drive(
    brain: &Brain,
    params: StreamParams,
    signals: &mut dyn SignalSource,
    emitter: &Emitter,
) -> StreamOutcome {
    let run_id = params.run_id.clone();
    let options = params.options.clone();

    let (mut state, start_index, mut pending_agent, mut webhook_payload) = match params.resume {
        None => (params.initial_state.clone(), 0usize, None, None),
        Some(resume_input) => {
            let ctx = match resume::reconstruct(&resume_input.prior_events, brain, Some(params.initial_state.clone())) {
                Ok(ctx) => ctx,
                Err(err) => {
                    return StreamOutcome::Error {
                        error: err.to_event_error(),
                        state: params.initial_state,
                    }
                }
            };
            (ctx.state, ctx.start_index, ctx.pending_agent, resume_input.webhook_payload)
        }
    };

    let is_restart = start_index > 0 || pending_agent.is_some();

    let start_event = if is_restart {
        Event::Restart {
            run_id: run_id.clone(),
            options: options.clone(),
            initial_state: state.clone(),
            ts: Utc::now(),
        }
    } else {
        Event::Start {
            run_id: run_id.clone(),
            options: options.clone(),
            initial_state: state.clone(),
            ts: Utc::now(),
        }
    };
    if !emitter.send(start_event).await {
        return StreamOutcome::Error {
            error: EventError::new("Error", "event stream consumer disconnected"),
            state,
        };
    }

    let mut step_records: Vec<StepRecord> = brain
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let mut rec = StepRecord::pending(block_id(&brain.title, i, b.title()), block_kind(b), b.title());
            if i < start_index {
                rec.status = StepStatus::Complete;
            }
            rec
        })
        .collect();

    if !emitter
        .send(Event::StepStatus {
            run_id: run_id.clone(),
            options: options.clone(),
            steps: step_records.clone(),
            ts: Utc::now(),
        })
        .await
    {
        return StreamOutcome::Error {
            error: EventError::new("Error", "event stream consumer disconnected"),
            state,
        };
    }

    let mut skipped_from: Option<usize> = None;

    for index in start_index..brain.blocks.len() {
        let (signal, _leftover) = check_safe_point(signals);
        match signal {
            Signal1::Kill => {
                if !emitter
                    .send(Event::Killed { run_id: run_id.clone(), options: options.clone(), ts: Utc::now() })
                    .await
                {}
                return StreamOutcome::Killed { state };
            }
            Signal1::Pause => {
                if !emitter
                    .send(Event::Paused { run_id: run_id.clone(), options: options.clone(), ts: Utc::now() })
                    .await
                {}
                return StreamOutcome::Paused { state };
            }
            Signal1::Continue => {}
        }

        if let Some(skip_from) = skipped_from {
            if index >= skip_from {
                step_records[index].status = StepStatus::Skipped;
                if !emitter
                    .send(Event::StepStatus {
                        run_id: run_id.clone(),
                        options: options.clone(),
                        steps: step_records.clone(),
                        ts: Utc::now(),
                    })
                    .await
                {
                    return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
                }
                continue;
            }
        }

        let block = &brain.blocks[index];
        let step_id = block_id(&brain.title, index, block.title());

        step_records[index].status = StepStatus::Running;
        if !emitter
            .send(Event::StepStart {
                run_id: run_id.clone(),
                options: options.clone(),
                step_id: step_id.clone(),
                ts: Utc::now(),
            })
            .await
        {
            return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
        }
        if !emitter
            .send(Event::StepStatus {
                run_id: run_id.clone(),
                options: options.clone(),
                steps: step_records.clone(),
                ts: Utc::now(),
            })
            .await
        {
            return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
        }

        let response = webhook_payload.take();

        match block {
            Block::Guard(guard) => {
                let passes = (guard.predicate)(&state, &options);
                step_records[index].status = StepStatus::Complete;
                if !passes {
                    skipped_from = Some(index + 1);
                }
            }
            Block::Step { action, .. } => {
                let pre_state = state.clone();
                let input = StepInput {
                    state: state.clone(),
                    options: options.clone(),
                    llm: params.llm.clone(),
                    response,
                };
                match run_step_with_retry(action.clone(), input, &run_id, &options, &step_id, emitter).await {
                    Ok(StepOutcome::State(new_state)) => {
                        let patch = diff_state(&pre_state, &new_state);
                        state = new_state;
                        step_records[index].status = StepStatus::Complete;
                        step_records[index].patch = Some(patch.clone());
                        if !emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch,
                                ts: Utc::now(),
                            })
                            .await
                        {
                            return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
                        }
                    }
                    Ok(StepOutcome::Wait { state: new_state, wait_for }) => {
                        let patch = diff_state(&pre_state, &new_state);
                        state = new_state;
                        step_records[index].status = StepStatus::Complete;
                        step_records[index].patch = Some(patch.clone());
                        emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch,
                                ts: Utc::now(),
                            })
                            .await;
                        emitter
                            .send(Event::Webhook {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                wait_for: wait_for.clone(),
                                ts: Utc::now(),
                            })
                            .await;
                        return StreamOutcome::Waiting { wait_for, state };
                    }
                    Ok(StepOutcome::Batch(config)) => {
                        let total = config.items.len();
                        let mut batch_results = Vec::with_capacity(total);
                        let mut completed = 0usize;
                        let mut suspend: Option<Signal1> = None;

                        for chunk in config.items.chunks(config.chunk_size) {
                            let (signal, _leftover) = check_safe_point(signals);
                            if !matches!(signal, Signal1::Continue) {
                                suspend = Some(signal);
                                break;
                            }

                            match batch::run_chunk(
                                chunk,
                                &config.handler,
                                config.concurrency,
                                config.max_retries,
                                config.on_error.as_ref(),
                            )
                            .await
                            {
                                Ok(mut chunk_results) => {
                                    completed += chunk.len();
                                    batch_results.append(&mut chunk_results);
                                    step_records[index].batch_status =
                                        Some(serde_json::json!({ "completed": completed, "total": total }));
                                    if !emitter
                                        .send(Event::StepStatus {
                                            run_id: run_id.clone(),
                                            options: options.clone(),
                                            steps: step_records.clone(),
                                            ts: Utc::now(),
                                        })
                                        .await
                                    {
                                        return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
                                    }
                                }
                                Err(err) => {
                                    step_records[index].status = StepStatus::Error;
                                    let error = err.to_event_error();
                                    emitter
                                        .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                                        .await;
                                    return StreamOutcome::Error { error, state };
                                }
                            }
                        }

                        // A PAUSE/KILL mid-batch leaves no STEP_COMPLETE for
                        // this step, so a subsequent resume simply restarts
                        // the whole batch rather than resuming partway
                        // through it (§9's batching open question).
                        match suspend {
                            Some(Signal1::Kill) => {
                                emitter
                                    .send(Event::Killed { run_id: run_id.clone(), options: options.clone(), ts: Utc::now() })
                                    .await;
                                return StreamOutcome::Killed { state };
                            }
                            Some(Signal1::Pause) => {
                                emitter
                                    .send(Event::Paused { run_id: run_id.clone(), options: options.clone(), ts: Utc::now() })
                                    .await;
                                return StreamOutcome::Paused { state };
                            }
                            Some(Signal1::Continue) | None => {}
                        }

                        let new_state = merge_batch_result(&state, &config.key, batch_results);
                        let patch = diff_state(&pre_state, &new_state);
                        state = new_state;
                        step_records[index].status = StepStatus::Complete;
                        step_records[index].patch = Some(patch.clone());
                        if !emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch,
                                ts: Utc::now(),
                            })
                            .await
                        {
                            return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
                        }
                    }
                    Err(err) => {
                        step_records[index].status = StepStatus::Error;
                        let error = err.to_event_error();
                        emitter
                            .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                            .await;
                        return StreamOutcome::Error { error, state };
                    }
                }
            }
            Block::Agent { config, .. } => {
                let cfg = match config(AgentConfigInput {
                    state: state.clone(),
                    options: options.clone(),
                    response: None,
                })
                .await
                {
                    Ok(cfg) => cfg,
                    Err(err) => {
                        step_records[index].status = StepStatus::Error;
                        let error = err.to_event_error();
                        emitter
                            .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                            .await;
                        return StreamOutcome::Error { error, state };
                    }
                };

                let llm = match &params.llm {
                    Some(llm) => llm.clone(),
                    None => {
                        let error = CoreError::Llm(brains_llm::LlmError::CapabilityMissing("generate_text".into())).to_event_error();
                        emitter
                            .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                            .await;
                        return StreamOutcome::Error { error, state };
                    }
                };

                let messages = match pending_agent.take() {
                    Some(PendingAgent { messages, pending_tool_call_id, pending_tool_name, .. }) => {
                        let mut messages = messages;
                        if let Some(payload) = response {
                            messages.push(brains_llm::Message::tool(
                                pending_tool_call_id,
                                pending_tool_name,
                                payload.to_string(),
                            ));
                        }
                        messages
                    }
                    None => {
                        emitter
                            .send(Event::AgentStart {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                prompt: Value::String(cfg.prompt.clone()),
                                system: cfg.system.clone(),
                                tools: cfg.tools.iter().map(|t| t.descriptor()).collect(),
                                ts: Utc::now(),
                            })
                            .await;
                        vec![brains_llm::Message::user(cfg.prompt.clone())]
                    }
                };

                let output_schema_name = cfg.output_schema.as_ref().map(|s| s.name.clone());
                let ctx = AgentContext { run_id: run_id.clone(), step_id: step_id.clone(), options: options.clone() };
                let tx = emitter.tx.clone();
                let outcome = run_agent(&ctx, llm.as_ref(), cfg, messages, signals, |event| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(event).await;
                    }
                })
                .await;

                match outcome {
                    Ok(AgentOutcome::Complete { terminal_tool_name, result, total_tokens }) => {
                        emitter
                            .send(Event::AgentComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                terminal_tool_name,
                                result: result.clone(),
                                total_tokens,
                                ts: Utc::now(),
                            })
                            .await;
                        let pre_state = state.clone();
                        let new_state = merge_agent_result(&state, &result, output_schema_name.as_deref());
                        let patch = diff_state(&pre_state, &new_state);
                        state = new_state;
                        step_records[index].status = StepStatus::Complete;
                        step_records[index].patch = Some(patch.clone());
                        emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch,
                                ts: Utc::now(),
                            })
                            .await;
                    }
                    Ok(AgentOutcome::Idle { .. }) => {
                        // §4.3 step 5: the loop ended without a terminal
                        // tool. No AGENT_COMPLETE, state untouched.
                        step_records[index].status = StepStatus::Complete;
                        emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch: diff_state(&state, &state),
                                ts: Utc::now(),
                            })
                            .await;
                    }
                    Ok(AgentOutcome::LimitReached { .. }) => {
                        // §4.3 step 7: the iteration/token cap is a terminal
                        // outcome, not an error — the run still reaches
                        // COMPLETE, same as `Idle`, with state untouched.
                        step_records[index].status = StepStatus::Complete;
                        emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch: diff_state(&state, &state),
                                ts: Utc::now(),
                            })
                            .await;
                    }
                    Ok(AgentOutcome::Wait { wait_for, .. }) => {
                        step_records[index].status = StepStatus::Running;
                        emitter
                            .send(Event::Webhook {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                wait_for: wait_for.clone(),
                                ts: Utc::now(),
                            })
                            .await;
                        return StreamOutcome::Waiting { wait_for, state };
                    }
                    Err(err) => {
                        step_records[index].status = StepStatus::Error;
                        let error = err.to_event_error();
                        emitter
                            .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                            .await;
                        return StreamOutcome::Error { error, state };
                    }
                }
            }
            Block::Brain(nested) => {
                let inner_initial = (nested.project)(&state);
                let inner_params = StreamParams {
                    run_id: run_id.clone(),
                    options: options.clone(),
                    initial_state: inner_initial,
                    llm: params.llm.clone(),
                    resume: None,
                };
                // Nested brains don't currently forward the parent's signal
                // queue (see resume's single-level stack note in DESIGN.md);
                // PAUSE/KILL are only honored at this level's safe points.
                let inner_stream = run_stream(nested.brain.clone(), inner_params, Box::new(brains_types::NoSignals));
                let mut inner_events = inner_stream.events;
                let pre_state = state.clone();
                use tokio_stream::StreamExt;
                while let Some(inner_event) = inner_events.next().await {
                    if !emitter.send(inner_event).await {
                        return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
                    }
                }
                match inner_stream.outcome.await {
                    Ok(StreamOutcome::Complete { final_state }) => {
                        let new_state = (nested.reduce)(&state, &final_state);
                        let patch = diff_state(&pre_state, &new_state);
                        state = new_state;
                        step_records[index].status = StepStatus::Complete;
                        step_records[index].patch = Some(patch.clone());
                        emitter
                            .send(Event::StepComplete {
                                run_id: run_id.clone(),
                                options: options.clone(),
                                step_id: step_id.clone(),
                                patch,
                                ts: Utc::now(),
                            })
                            .await;
                    }
                    Ok(other) => return remap_nonlocal_outcome(other, state),
                    Err(_) => {
                        let error = EventError::new("Error", "nested brain stream ended unexpectedly");
                        emitter
                            .send(Event::Error { run_id: run_id.clone(), options: options.clone(), error: error.clone(), ts: Utc::now() })
                            .await;
                        return StreamOutcome::Error { error, state };
                    }
                }
            }
        }

        if !emitter
            .send(Event::StepStatus {
                run_id: run_id.clone(),
                options: options.clone(),
                steps: step_records.clone(),
                ts: Utc::now(),
            })
            .await
        {
            return StreamOutcome::Error { error: EventError::new("Error", "consumer disconnected"), state };
        }
    }

    emitter
        .send(Event::Complete {
            run_id: run_id.clone(),
            options: options.clone(),
            final_state: state.clone(),
            ts: Utc::now(),
        })
        .await;
    StreamOutcome::Complete { final_state: state }
}

fn remap_nonlocal_outcome(outcome: StreamOutcome, outer_state: State) -> StreamOutcome {
    match outcome {
        StreamOutcome::Waiting { wait_for, .. } => StreamOutcome::Waiting { wait_for, state: outer_state },
        StreamOutcome::Paused { .. } => StreamOutcome::Paused { state: outer_state },
        StreamOutcome::Killed { .. } => StreamOutcome::Killed { state: outer_state },
        StreamOutcome::Error { error, .. } => StreamOutcome::Error { error, state: outer_state },
        complete @ StreamOutcome::Complete { .. } => complete,
    }
}

/// §4.3's state effect: spread the terminal tool's args at the state root,
/// unless the agent declared an `outputSchema{name}`, in which case the
/// whole result lands namespaced under that key instead of being spread.
fn merge_agent_result(state: &State, result: &Value, output_schema_name: Option<&str>) -> State {
    if let Some(name) = output_schema_name {
        return match state.as_object() {
            Some(state_obj) => {
                let mut merged = state_obj.clone();
                merged.insert(name.to_string(), result.clone());
                Value::Object(merged)
            }
            None => serde_json::json!({ name: result }),
        };
    }
    match (state.as_object(), result.as_object()) {
        (Some(state_obj), Some(result_obj)) => {
            let mut merged = state_obj.clone();
            for (k, v) in result_obj {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => result.clone(),
    }
}

/// §4.2's batch state effect: record the ordered `[item, output]` pairs under
/// `key`, namespaced the same way an agent's `outputSchema` result is.
fn merge_batch_result(state: &State, key: &str, results: Vec<Value>) -> State {
    let value = Value::Array(results);
    match state.as_object() {
        Some(state_obj) => {
            let mut merged = state_obj.clone();
            merged.insert(key.to_string(), value);
            Value::Object(merged)
        }
        None => serde_json::json!({ key: value }),
    }
}

async fn run_step_with_retry(
    action: crate::graph::StepFn,
    input: StepInput,
    run_id: &str,
    options: &Value,
    step_id: &str,
    emitter: &Emitter,
) -> Result<StepOutcome> {
    let retry_input = StepInput {
        state: input.state.clone(),
        options: input.options.clone(),
        llm: input.llm.clone(),
        response: input.response.clone(),
    };
    match action(input).await {
        Ok(outcome) => Ok(outcome),
        Err(first_err) => {
            emitter
                .send(Event::StepRetry {
                    run_id: run_id.to_string(),
                    options: options.clone(),
                    step_id: step_id.to_string(),
                    error: first_err.to_event_error(),
                    ts: Utc::now(),
                })
                .await;
            action(retry_input).await
        }
    }
}

fn block_kind(block: &Block) -> StepKind {
    match block {
        Block::Step { .. } => StepKind::Step,
        Block::Agent { .. } => StepKind::Agent,
        Block::Brain(_) => StepKind::Brain,
        Block::Guard(_) => StepKind::Guard,
    }
}
