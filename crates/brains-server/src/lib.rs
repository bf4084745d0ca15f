//! HTTP surface for the brains workflow runtime. Wires [`brains_runtime`]'s
//! [`brains_runtime::Supervisor`], [`brains_runtime::Scheduler`], and
//! [`brains_runtime::WebhookRouter`] onto an axum [`axum::Router`] implementing
//! the subset of endpoints named in the runtime design's external interfaces.

pub mod api;

pub use api::{create_router, AppState};
