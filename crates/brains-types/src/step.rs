//! Steps: the run-time instance of one block in a brain's step graph.

use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of block a step was instantiated from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Step,
    Agent,
    Brain,
    Guard,
}

/// `PENDING -> RUNNING -> {COMPLETE|ERROR|SKIPPED}`. Guards can push the
/// remaining steps in a brain straight to `Skipped`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Error,
    Skipped,
}

/// One block's run-time record. `id` is generated the first time the step is
/// observed and is preserved verbatim across any number of resumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub kind: StepKind,
    pub title: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_status: Option<Value>,
}

impl StepRecord {
    pub fn pending(id: impl Into<String>, kind: StepKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            status: StepStatus::Pending,
            patch: None,
            batch_status: None,
        }
    }
}
