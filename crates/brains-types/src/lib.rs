//! Durable event model and data types for the brains workflow runtime.
//!
//! This crate has no opinions about execution, storage, or LLMs — it is the
//! wire format everything else agrees on. `brains-checkpoint` persists
//! [`Event`]s, `brains-core` produces and folds them, `brains-runtime` routes
//! [`Signal`]s and [`WebhookRegistration`]s around a [`RunRecord`].

pub mod error;
pub mod event;
pub mod run;
pub mod signal;
pub mod state;
pub mod step;
pub mod tool;
pub mod webhook;

pub use error::{Result, TypesError};
pub use event::{Event, EventError};
pub use run::{RunRecord, RunStatus};
pub use signal::{NoSignals, Signal, SignalKind, SignalRejected, SignalSource};
pub use state::{apply_patch, diff_state, empty_state, fold_patches, State};
pub use step::{StepKind, StepRecord, StepStatus};
pub use tool::ToolDescriptor;
pub use webhook::{WebhookRegistration, TIMEOUT_SENTINEL};
