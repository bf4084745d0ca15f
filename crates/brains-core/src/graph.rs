//! Step graph types: the ordered list of blocks a brain executes, and the
//! fluent builder used to assemble one. Unlike a general node/edge graph,
//! a brain's blocks always run in the sequence they were added — branching
//! is expressed with a [`Block::Guard`] that can short-circuit the rest of
//! the sequence, not with conditional edges.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};

use brains_llm::LlmClient;
use brains_types::{State, ToolDescriptor, WebhookRegistration};
use serde_json::Value;
use uuid::Uuid;

use crate::batch::BatchConfig;
use crate::error::{CoreError, Result};

/// Deterministic id for the block at `index` of `brain_title`, stable across
/// every run of the same graph since the graph is a pure description
/// (§4.1) — resumption never needs to persist an id-allocation table.
pub(crate) fn block_id(brain_title: &str, index: usize, block_title: &str) -> String {
    let name = format!("brains:{brain_title}:{index}:{block_title}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Input handed to a [`Block::Step`] action: the state accumulated so far,
/// the brain's run-level options, and (when the step is resumed after a
/// webhook wait) the webhook's response payload.
pub struct StepInput {
    pub state: State,
    pub options: Value,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub response: Option<Value>,
}

/// What a step produced. `Wait` suspends the run until a matching
/// `WEBHOOK_RESPONSE` signal arrives, at which point the step re-runs with
/// `StepInput::response` populated. `Batch` hands a batch-prompt config back
/// to the event stream, which drives it chunk-at-a-time so it can consult the
/// run's `SignalSource` at each chunk boundary (§4.2, §4.5) — something a
/// `'static` step action has no access to on its own.
pub enum StepOutcome {
    State(State),
    Wait {
        state: State,
        wait_for: Vec<WebhookRegistration>,
    },
    Batch(BatchConfig),
}

pub type StepFn =
    Arc<dyn Fn(StepInput) -> BoxFuture<'static, Result<StepOutcome>> + Send + Sync>;

/// A callable tool the agent sub-loop can invoke. `execute: None` marks a
/// purely declarative tool (the model is told it exists but nothing in this
/// process runs it — used for tools resolved by a human or another system).
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub terminal: bool,
    pub execute: Option<Arc<dyn Fn(Value) -> BoxFuture<'static, Result<ToolOutcome>> + Send + Sync>>,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            terminal: false,
            execute: None,
        }
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_execute<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> BoxFuture<'static, Result<ToolOutcome>> + Send + Sync + 'static,
    {
        self.execute = Some(Arc::new(f));
        self
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let mut d = ToolDescriptor::new(&self.name, &self.description, self.input_schema.clone());
        if self.terminal {
            d = d.terminal();
        }
        d
    }
}

/// The result of running a non-terminal tool: either a value to feed back to
/// the model as a tool message, or a set of webhooks to suspend the agent on.
#[derive(Default)]
pub struct ToolOutcome {
    pub result: Option<Value>,
    pub wait_for: Option<Vec<WebhookRegistration>>,
}

impl ToolOutcome {
    pub fn result(value: Value) -> Self {
        Self {
            result: Some(value),
            wait_for: None,
        }
    }

    pub fn wait_for(registrations: Vec<WebhookRegistration>) -> Self {
        Self {
            result: None,
            wait_for: Some(registrations),
        }
    }
}

/// Parameters for an agent sub-loop, produced fresh for every `AGENT_START`
/// since a brain author may want the prompt or tool set to depend on state.
pub struct AgentConfig {
    pub prompt: String,
    pub system: Option<String>,
    pub tools: Vec<Tool>,
    pub max_tokens: Option<u64>,
    pub max_iterations: Option<u32>,
    pub output_schema: Option<OutputSchema>,
}

impl AgentConfig {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            tools: Vec::new(),
            max_tokens: None,
            max_iterations: None,
            output_schema: None,
        }
    }
}

pub struct OutputSchema {
    pub schema: Value,
    pub name: String,
}

pub struct AgentConfigInput {
    pub state: State,
    pub options: Value,
    pub response: Option<Value>,
}

pub type AgentConfigFn =
    Arc<dyn Fn(AgentConfigInput) -> BoxFuture<'static, Result<AgentConfig>> + Send + Sync>;

/// A brain embedded as a single block of its parent. `project` derives the
/// child's initial state from the parent's; `reduce` folds the child's final
/// state back into the parent's.
pub struct NestedBrain {
    pub title: String,
    pub brain: Arc<Brain>,
    pub project: Arc<dyn Fn(&State) -> State + Send + Sync>,
    pub reduce: Arc<dyn Fn(&State, &State) -> State + Send + Sync>,
}

/// A short-circuit check evaluated before the rest of the sequence. When
/// `predicate` returns `false` the brain completes immediately with a
/// `SKIPPED` status recorded for every block after this guard.
pub struct Guard {
    pub title: String,
    pub predicate: Arc<dyn Fn(&State, &Value) -> bool + Send + Sync>,
}

pub enum Block {
    Step { title: String, action: StepFn },
    Agent { title: String, config: AgentConfigFn },
    Brain(NestedBrain),
    Guard(Guard),
}

impl Block {
    pub fn title(&self) -> &str {
        match self {
            Block::Step { title, .. } => title,
            Block::Agent { title, .. } => title,
            Block::Brain(nested) => &nested.title,
            Block::Guard(guard) => &guard.title,
        }
    }
}

/// An ordered sequence of blocks, identified by a process-unique title.
pub struct Brain {
    pub title: String,
    pub blocks: Vec<Block>,
}

fn registered_titles() -> &'static Mutex<HashSet<String>> {
    static TITLES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    TITLES.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Test-mode escape hatch for the process-local title registry (§9): tests
/// that build throwaway brains under the same title repeatedly can call this
/// between cases instead of picking a fresh title every time.
pub fn clear_title_registry() {
    registered_titles().lock().unwrap().clear();
}

/// Fluent constructor for a [`Brain`]. Enforces that a brain title is
/// registered at most once per process, mirroring the uniqueness the
/// scheduler and run-listing API rely on to address a brain by title.
pub struct BrainBuilder {
    title: String,
    blocks: Vec<Block>,
}

impl BrainBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn step<F>(mut self, title: impl Into<String>, action: F) -> Self
    where
        F: Fn(StepInput) -> BoxFuture<'static, Result<StepOutcome>> + Send + Sync + 'static,
    {
        self.blocks.push(Block::Step {
            title: title.into(),
            action: Arc::new(action),
        });
        self
    }

    pub fn agent<F>(mut self, title: impl Into<String>, config: F) -> Self
    where
        F: Fn(AgentConfigInput) -> BoxFuture<'static, Result<AgentConfig>> + Send + Sync + 'static,
    {
        self.blocks.push(Block::Agent {
            title: title.into(),
            config: Arc::new(config),
        });
        self
    }

    pub fn brain(mut self, nested: NestedBrain) -> Self {
        self.blocks.push(Block::Brain(nested));
        self
    }

    pub fn guard<F>(mut self, title: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&State, &Value) -> bool + Send + Sync + 'static,
    {
        self.blocks.push(Block::Guard(Guard {
            title: title.into(),
            predicate: Arc::new(predicate),
        }));
        self
    }

    /// Validate and register the title, producing an immutable [`Brain`].
    /// Fails if the title is empty, no blocks were added, or the title was
    /// already registered by a prior `build()` in this process.
    pub fn build(self) -> Result<Brain> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("a brain title cannot be empty".into()));
        }
        if self.blocks.is_empty() {
            return Err(CoreError::Validation(format!(
                "brain '{}' has no blocks",
                self.title
            )));
        }
        let mut titles = registered_titles().lock().unwrap();
        if !titles.insert(self.title.clone()) {
            return Err(CoreError::DuplicateBrainTitle(self.title));
        }
        Ok(Brain {
            title: self.title,
            blocks: self.blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_titles_are_rejected() {
        clear_title_registry();
        let first = BrainBuilder::new("dup-test")
            .step("noop", |input| Box::pin(async move { Ok(StepOutcome::State(input.state)) }))
            .build();
        assert!(first.is_ok());

        let second = BrainBuilder::new("dup-test")
            .step("noop", |input| Box::pin(async move { Ok(StepOutcome::State(input.state)) }))
            .build();
        assert!(matches!(second, Err(CoreError::DuplicateBrainTitle(_))));
    }

    #[test]
    fn empty_brain_is_rejected() {
        clear_title_registry();
        let result = BrainBuilder::new("empty-test").build();
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
