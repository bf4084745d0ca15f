//! Run supervisor, signal queue, scheduler, and webhook router for the brains
//! workflow runtime: everything that sits between the durable execution
//! engine in `brains-core` and an external HTTP surface.

pub mod error;
pub mod registry;
pub mod scheduler;
pub mod signals;
pub mod supervisor;
pub mod webhook;

pub use error::{Result, RuntimeError};
pub use registry::{BrainDescriptor, BrainRegistry};
pub use scheduler::{ScheduleRegistration, ScheduledRunEntry, Scheduler, TriggerOutcome};
pub use signals::SignalQueue;
pub use supervisor::Supervisor;
pub use webhook::{HandlerOutcome, HandlerResponse, WebhookAction, WebhookRouter};
