//! Step graph, agent sub-loop, and event stream driver for the brains
//! workflow runtime: the crate that actually runs a [`Brain`] and turns its
//! execution into the durable event sequence `brains-checkpoint` persists.

pub mod agent;
pub mod batch;
pub mod error;
pub mod graph;
pub mod resume;
pub mod stream;

pub use agent::{run_agent, AgentContext, AgentOutcome};
pub use batch::{run_batch, run_chunk, BatchConfig, ErrorHandler, ItemHandler};
pub use error::{CoreError, Result};
pub use graph::{
    AgentConfig, AgentConfigFn, AgentConfigInput, Block, BoxFuture, Brain, BrainBuilder, Guard,
    NestedBrain, OutputSchema, StepFn, StepInput, StepOutcome, Tool, ToolOutcome,
};
pub use resume::{reconstruct, reconstruct_pending_agent, reconstruct_stack, reconstruct_state, PendingAgent, ResumeContext};
pub use stream::{run_stream, EventStream, ResumeInput, StreamOutcome, StreamParams};
