//! Per-run ownership, live event multicast, and signal legality — §4.5 and
//! §4.6 of the runtime design. The supervisor is the only thing that ever
//! drives [`brains_core::run_stream`] or appends to an [`EventLog`]; nothing
//! else in this crate touches either directly.

use std::sync::Arc;
use std::time::Duration;

use brains_checkpoint::EventLog;
use brains_core::{run_stream, Brain, ResumeInput, StreamOutcome, StreamParams};
use brains_llm::LlmClient;
use brains_types::{
    empty_state, Event, RunRecord, RunStatus, Signal, SignalKind, SignalRejected, State,
    WebhookRegistration,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;

use crate::error::{Result, RuntimeError};
use crate::registry::BrainRegistry;
use crate::signals::SignalQueue;

const WATCH_BUFFER: usize = 256;

/// In-memory index kept alongside the durable log: everything here is
/// derivable by replaying the log, but the supervisor needs it hot for
/// signal legality checks and webhook matching without a round trip to
/// storage on every request.
struct RunState {
    queue: SignalQueue,
    tx: broadcast::Sender<Event>,
    status: RunStatus,
    active_agent: bool,
    wait_for: Vec<WebhookRegistration>,
}

impl RunState {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(WATCH_BUFFER);
        Self {
            queue: SignalQueue::new(),
            tx,
            status: RunStatus::Running,
            active_agent: false,
            wait_for: Vec::new(),
        }
    }

    /// Fold one just-appended event into the derived state this struct
    /// caches. Mirrors the status transitions `brains_core::resume` derives
    /// from cold storage, kept live here for signals and webhook matching.
    fn observe(&mut self, event: &Event) {
        match event {
            Event::AgentStart { .. } => self.active_agent = true,
            Event::AgentComplete { .. }
            | Event::AgentTokenLimit { .. }
            | Event::AgentIterationLimit { .. } => self.active_agent = false,
            Event::Webhook { wait_for, .. } => {
                self.active_agent = false;
                self.wait_for = wait_for.clone();
                self.status = RunStatus::Waiting;
            }
            Event::Paused { .. } => self.status = RunStatus::Paused,
            Event::Resumed { .. } | Event::Restart { .. } | Event::Start { .. } => {
                self.status = RunStatus::Running;
            }
            Event::Complete { .. } => self.status = RunStatus::Complete,
            Event::Error { .. } => self.status = RunStatus::Error,
            Event::Killed { .. } => self.status = RunStatus::Killed,
            _ => {}
        }
    }
}

pub struct Supervisor {
    log: Arc<dyn EventLog>,
    registry: Arc<BrainRegistry>,
    llm: Option<Arc<dyn LlmClient>>,
    heartbeat_interval: Duration,
    runs: DashMap<String, RunState>,
}

impl Supervisor {
    pub fn new(log: Arc<dyn EventLog>, registry: Arc<BrainRegistry>, llm: Option<Arc<dyn LlmClient>>) -> Arc<Self> {
        Arc::new(Self {
            log,
            registry,
            llm,
            heartbeat_interval: Duration::from_secs(15),
            runs: DashMap::new(),
        })
    }

    pub fn with_heartbeat_interval(log: Arc<dyn EventLog>, registry: Arc<BrainRegistry>, llm: Option<Arc<dyn LlmClient>>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            log,
            registry,
            llm,
            heartbeat_interval: interval,
            runs: DashMap::new(),
        })
    }

    /// `GET /brains`: the catalog of brains this process can start runs for.
    pub fn list_brains(&self) -> Vec<crate::registry::BrainDescriptor> {
        self.registry.list()
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.log.get_run(run_id).await?)
    }

    pub async fn list_runs(&self, brain_title: Option<&str>, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        Ok(self.log.list_runs(brain_title, limit).await?)
    }

    pub async fn read_all(&self, run_id: &str) -> Result<Vec<Event>> {
        Ok(self.log.read_all(run_id).await?)
    }

    /// Subscribe to a run's live feed. Callers that need history too should
    /// `read_all` first and then subscribe; there is an unavoidable but
    /// small race between the two calls, which the subscriber's own
    /// reconnect-and-replay logic (§4.6) is expected to paper over.
    pub fn watch(&self, run_id: &str) -> Result<broadcast::Receiver<Event>> {
        let state = self.runs.get(run_id).ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
        Ok(state.tx.subscribe())
    }

    /// `POST /brains/runs`: validate the brain exists, create its run
    /// record, and start its executor.
    pub async fn start_run(self: &Arc<Self>, brain_title: &str, options: Value, initial_state: Option<State>) -> Result<RunRecord> {
        let brain = self
            .registry
            .get(brain_title)
            .ok_or_else(|| RuntimeError::UnknownBrain(brain_title.to_string()))?;

        let record = RunRecord::new(brain_title, options.clone());
        self.log.create_run(record.clone()).await?;
        self.runs.insert(record.run_id.clone(), RunState::new());

        let owner_token = uuid::Uuid::new_v4().to_string();
        self.log.acquire_owner(&record.run_id, &owner_token).await?;

        let params = StreamParams {
            run_id: record.run_id.clone(),
            options,
            initial_state: initial_state.unwrap_or_else(empty_state),
            llm: self.llm.clone(),
            resume: None,
        };
        self.spawn_executor(record.run_id.clone(), brain, params, owner_token);
        Ok(record)
    }

    /// `POST /brains/runs/:id/resume`: only legal from `PAUSED`.
    pub async fn resume_run(self: &Arc<Self>, run_id: &str) -> Result<()> {
        let record = self.log.get_run(run_id).await?.ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
        {
            let state = self.runs.get(run_id).ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
            if state.status != RunStatus::Paused {
                return Err(SignalRejected::NotPaused.into());
            }
        }
        let brain = self
            .registry
            .get(&record.brain_title)
            .ok_or_else(|| RuntimeError::UnknownBrain(record.brain_title.clone()))?;

        let owner_token = uuid::Uuid::new_v4().to_string();
        self.log.acquire_owner(run_id, &owner_token).await?;
        let resumed_event = Event::Resumed { run_id: run_id.to_string(), options: record.options.clone(), ts: Utc::now() };
        self.log.append(run_id, &owner_token, resumed_event.clone()).await?;
        self.broadcast(run_id, resumed_event);

        let prior_events = self.log.read_all(run_id).await?;
        let params = StreamParams {
            run_id: run_id.to_string(),
            options: record.options,
            initial_state: empty_state(),
            llm: self.llm.clone(),
            resume: Some(ResumeInput { prior_events, webhook_payload: None }),
        };
        self.spawn_executor(run_id.to_string(), brain, params, owner_token);
        Ok(())
    }

    /// `POST /brains/runs/:id/signals`: the single entry point for all five
    /// signal kinds, enforcing §4.5's legality rules before anything is
    /// queued or acted on.
    pub async fn enqueue_signal(self: &Arc<Self>, run_id: &str, kind: SignalKind) -> Result<Signal> {
        match kind {
            SignalKind::Resume => {
                self.resume_run(run_id).await?;
                return Ok(Signal::new(SignalKind::Resume));
            }
            SignalKind::WebhookResponse { ref response, .. } => {
                self.deliver_webhook_response(run_id, response.clone()).await?;
                return Ok(Signal::new(kind));
            }
            _ => {}
        }

        let mut state = self.runs.get_mut(run_id).ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
        match &kind {
            SignalKind::UserMessage { .. } if !state.active_agent => {
                return Err(SignalRejected::NoActiveAgent.into());
            }
            SignalKind::Pause if state.status != RunStatus::Running => {
                return Err(SignalRejected::NotPaused.into());
            }
            SignalKind::Kill if state.status.is_terminal() => {
                return Err(RuntimeError::RunTerminal(run_id.to_string()));
            }
            _ => {}
        }

        // A PAUSED or WAITING run has no live executor polling its queue, so
        // KILL is applied immediately instead of waiting for a safe point
        // that will never come until something else resumes the run.
        if matches!(kind, SignalKind::Kill) && matches!(state.status, RunStatus::Paused | RunStatus::Waiting) {
            state.status = RunStatus::Killed;
            drop(state);
            let record = self.log.get_run(run_id).await?.ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
            let killed = Event::Killed { run_id: run_id.to_string(), options: record.options, ts: Utc::now() };
            self.log.set_run_status(run_id, RunStatus::Killed).await?;
            self.broadcast(run_id, killed);
            return Ok(Signal::new(SignalKind::Kill));
        }

        let signal = Signal::new(kind);
        state.queue.enqueue(signal.clone());
        Ok(signal)
    }

    /// Webhook delivery (§4.7 step 1) and `WEBHOOK_RESPONSE` signals both
    /// land here: only legal from `WAITING`, and it restarts the executor
    /// directly rather than feeding a live `SignalSource`, since the prior
    /// executor already exited when it suspended.
    pub async fn deliver_webhook_response(self: &Arc<Self>, run_id: &str, response: Value) -> Result<()> {
        let record = self.log.get_run(run_id).await?.ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
        {
            let state = self.runs.get(run_id).ok_or_else(|| RuntimeError::UnknownRun(run_id.to_string()))?;
            if state.status != RunStatus::Waiting {
                return Err(SignalRejected::NotWaiting.into());
            }
        }
        let brain = self
            .registry
            .get(&record.brain_title)
            .ok_or_else(|| RuntimeError::UnknownBrain(record.brain_title.clone()))?;

        let owner_token = uuid::Uuid::new_v4().to_string();
        self.log.acquire_owner(run_id, &owner_token).await?;
        let prior_events = self.log.read_all(run_id).await?;
        let params = StreamParams {
            run_id: run_id.to_string(),
            options: record.options,
            initial_state: empty_state(),
            llm: self.llm.clone(),
            resume: Some(ResumeInput { prior_events, webhook_payload: Some(response) }),
        };
        self.spawn_executor(run_id.to_string(), brain, params, owner_token);
        Ok(())
    }

    /// Match an inbound `(slug, identifier)` webhook against runs currently
    /// `WAITING` on that exact registration (§4.7 step 1).
    pub fn find_waiting_run(&self, slug: &str, identifier: &str) -> Option<String> {
        self.runs.iter().find_map(|entry| {
            let matches = entry.value().status == RunStatus::Waiting
                && entry.value().wait_for.iter().any(|w| w.matches(slug, identifier));
            matches.then(|| entry.key().clone())
        })
    }

    fn broadcast(&self, run_id: &str, event: Event) {
        if let Some(state) = self.runs.get(run_id) {
            let _ = state.tx.send(event);
        }
    }

    fn spawn_executor(self: &Arc<Self>, run_id: String, brain: Arc<Brain>, params: StreamParams, owner_token: String) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.drive_to_completion(run_id, brain, params, owner_token).await;
        });
    }

    async fn drive_to_completion(self: Arc<Self>, run_id: String, brain: Arc<Brain>, params: StreamParams, owner_token: String) {
        let signals: Box<dyn brains_types::SignalSource> = match self.runs.get(&run_id) {
            Some(state) => Box::new(state.queue.clone()),
            None => return,
        };

        let stream = run_stream(brain, params, signals);
        let mut events = stream.events;
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                next = events.next() => {
                    match next {
                        Some(event) => {
                            if self.log.append(&run_id, &owner_token, event.clone()).await.is_err() {
                                break;
                            }
                            if let Some(mut state) = self.runs.get_mut(&run_id) {
                                state.observe(&event);
                            }
                            self.broadcast(&run_id, event);
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if let Ok(Some(record)) = self.log.get_run(&run_id).await {
                        let hb = Event::Heartbeat { run_id: run_id.clone(), options: record.options, ts: Utc::now() };
                        let _ = self.log.append(&run_id, &owner_token, hb.clone()).await;
                        self.broadcast(&run_id, hb);
                    }
                }
            }
        }

        match stream.outcome.await {
            Ok(StreamOutcome::Complete { .. }) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Complete).await;
            }
            Ok(StreamOutcome::Error { .. }) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Error).await;
            }
            Ok(StreamOutcome::Killed { .. }) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Killed).await;
            }
            Ok(StreamOutcome::Paused { .. }) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Paused).await;
            }
            Ok(StreamOutcome::Waiting { .. }) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Waiting).await;
            }
            Err(_) => {
                let _ = self.log.set_run_status(&run_id, RunStatus::Error).await;
            }
        }
        let _ = self.log.release_owner(&run_id, &owner_token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_checkpoint::InMemoryEventLog;
    use brains_core::{BrainBuilder, StepOutcome};
    use serde_json::json;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    fn counting_brain(title: &str) -> Arc<Brain> {
        Arc::new(
            BrainBuilder::new(title)
                .step("increment", |input| {
                    Box::pin(async move {
                        let count = input.state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                        Ok(StepOutcome::State(json!({"count": count + 1})))
                    })
                })
                .build()
                .unwrap(),
        )
    }

    async fn wait_for_terminal(supervisor: &Supervisor, run_id: &str) -> RunStatus {
        for _ in 0..200 {
            if let Ok(Some(record)) = supervisor.get_run(run_id).await {
                if record.status.is_terminal() || record.status == RunStatus::Paused || record.status == RunStatus::Waiting {
                    return record.status;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("run never reached a settled status");
    }

    #[tokio::test]
    async fn start_run_completes_and_appends_events() {
        brains_core::graph::clear_title_registry();
        let mut registry = BrainRegistry::new();
        registry.register(counting_brain("counter-1"), "increments a counter");
        let log = Arc::new(InMemoryEventLog::new());
        let supervisor = Supervisor::new(log, Arc::new(registry), None);

        let record = supervisor.start_run("counter-1", json!({}), None).await.unwrap();
        let status = wait_for_terminal(&supervisor, &record.run_id).await;
        assert_eq!(status, RunStatus::Complete);

        let events = supervisor.read_all(&record.run_id).await.unwrap();
        assert!(events.iter().any(|e| e.event_type() == "START"));
        assert!(events.iter().any(|e| e.event_type() == "COMPLETE"));
    }

    #[tokio::test]
    async fn unknown_brain_is_rejected() {
        brains_core::graph::clear_title_registry();
        let log = Arc::new(InMemoryEventLog::new());
        let supervisor = Supervisor::new(log, Arc::new(BrainRegistry::new()), None);
        let err = supervisor.start_run("missing", json!({}), None).await.unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownBrain(_)));
    }

    #[tokio::test]
    async fn watch_receives_live_events() {
        brains_core::graph::clear_title_registry();
        let mut registry = BrainRegistry::new();
        registry.register(counting_brain("counter-2"), "increments a counter");
        let log = Arc::new(InMemoryEventLog::new());
        let supervisor = Supervisor::new(log, Arc::new(registry), None);

        let record = supervisor.start_run("counter-2", json!({}), None).await.unwrap();
        let mut rx = supervisor.watch(&record.run_id).unwrap();
        let first = timeout(StdDuration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.run_id(), record.run_id);
    }
}
