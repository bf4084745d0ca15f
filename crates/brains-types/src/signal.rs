//! Out-of-band signals: the supervisor's only way to steer a run it does not
//! own the call stack of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The five signal kinds a run's FIFO queue can carry. Signals are not events
/// themselves; their effects are only observable through the events they trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Pause,
    Resume,
    Kill,
    UserMessage { content: String },
    WebhookResponse {
        slug: String,
        identifier: String,
        response: Value,
    },
}

impl SignalKind {
    pub fn label(&self) -> &'static str {
        match self {
            SignalKind::Pause => "PAUSE",
            SignalKind::Resume => "RESUME",
            SignalKind::Kill => "KILL",
            SignalKind::UserMessage { .. } => "USER_MESSAGE",
            SignalKind::WebhookResponse { .. } => "WEBHOOK_RESPONSE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub kind: SignalKind,
    pub queued_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            queued_at: Utc::now(),
        }
    }
}

/// A non-blocking source of queued signals, polled by the engine at the safe
/// points named in §4.5 (between blocks, between agent iterations, before a
/// batch chunk). The supervisor owns the actual queue; this trait is the only
/// thing the execution engine needs to know about it.
pub trait SignalSource: Send {
    /// Pop the next queued signal, if any, without blocking.
    fn try_recv(&mut self) -> Option<Signal>;
}

/// A `SignalSource` that never has anything queued, for running a brain
/// end-to-end with no supervisor attached (tests, examples).
pub struct NoSignals;

impl SignalSource for NoSignals {
    fn try_recv(&mut self) -> Option<Signal> {
        None
    }
}

/// Rejection reason for a signal that failed the legality checks in the engine's
/// spec (§4.5/§8 property 7). Callers surface this as a 409-equivalent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalRejected {
    #[error("USER_MESSAGE requires an in-flight agent sub-loop")]
    NoActiveAgent,
    #[error("RESUME is only valid while a run is PAUSED")]
    NotPaused,
    #[error("WEBHOOK_RESPONSE is only valid while a run is WAITING")]
    NotWaiting,
    #[error("run {0} not found")]
    RunNotFound(String),
}
