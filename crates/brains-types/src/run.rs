//! Run identity: one execution of one brain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status of a run. A run ends in exactly one of `Complete`, `Error`,
/// or `Killed`; no events are appended after that point (terminal quiescence).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Paused,
    Waiting,
    Complete,
    Error,
    Killed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Error | RunStatus::Killed)
    }
}

/// Metadata record for one run. The event log itself is owned by a
/// `brains-checkpoint` backend, not embedded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub brain_title: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Options supplied at start, already validated against the brain's options schema.
    pub options: Value,
}

impl RunRecord {
    pub fn new(brain_title: impl Into<String>, options: Value) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            brain_title: brain_title.into(),
            status: RunStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            options,
        }
    }
}
