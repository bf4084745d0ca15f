//! In-memory [`EventLog`] for tests and local development. Ephemeral: all data
//! is lost on process exit, which is exactly why the supervisor is built
//! against the trait rather than this type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use brains_types::{Event, RunRecord, RunStatus};
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{CheckpointError, Result};
use crate::traits::EventLog;

struct RunEntry {
    record: RunRecord,
    events: Vec<Event>,
    owner: Option<String>,
}

/// Thread-safe, process-local event log.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    runs: Arc<RwLock<HashMap<String, RunEntry>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all stored runs. Useful for isolating tests.
    pub async fn clear(&self) {
        self.runs.write().await.clear();
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn create_run(&self, record: RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&record.run_id) {
            return Err(CheckpointError::Invalid(format!(
                "run {} already exists",
                record.run_id
            )));
        }
        runs.insert(
            record.run_id.clone(),
            RunEntry {
                record,
                events: Vec::new(),
                owner: None,
            },
        );
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(run_id).map(|e| e.record.clone()))
    }

    async fn set_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        entry.record.status = status;
        if status.is_terminal() {
            entry.record.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_runs(&self, brain_title: Option<&str>, limit: Option<usize>) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let mut records: Vec<RunRecord> = runs
            .values()
            .map(|e| e.record.clone())
            .filter(|r| brain_title.map_or(true, |t| r.brain_title == t))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn acquire_owner(&self, run_id: &str, owner_token: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        if let Some(existing) = &entry.owner {
            if existing != owner_token {
                return Err(CheckpointError::OwnershipConflict(run_id.to_string()));
            }
        }
        entry.owner = Some(owner_token.to_string());
        Ok(())
    }

    async fn release_owner(&self, run_id: &str, owner_token: &str) -> Result<()> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        if entry.owner.as_deref() == Some(owner_token) {
            entry.owner = None;
        }
        Ok(())
    }

    async fn append(&self, run_id: &str, owner_token: &str, event: Event) -> Result<u64> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;

        if entry.owner.as_deref() != Some(owner_token) {
            return Err(CheckpointError::OwnershipConflict(run_id.to_string()));
        }
        if let Some(last) = entry.events.last() {
            if last.is_terminal() {
                return Err(CheckpointError::Terminal(run_id.to_string()));
            }
        }

        entry.events.push(event);
        Ok((entry.events.len() - 1) as u64)
    }

    async fn read_all(&self, run_id: &str) -> Result<Vec<Event>> {
        let runs = self.runs.read().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| CheckpointError::NotFound(run_id.to_string()))?;
        Ok(entry.events.clone())
    }

    async fn read_from(&self, run_id: &str, offset: u64) -> Result<Vec<Event>> {
        let all = self.read_all(run_id).await?;
        Ok(all.into_iter().skip(offset as usize).collect())
    }

    async fn len(&self, run_id: &str) -> Result<u64> {
        Ok(self.read_all(run_id).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn heartbeat(run_id: &str) -> Event {
        Event::Heartbeat {
            run_id: run_id.to_string(),
            options: json!({}),
            ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_requires_ownership() {
        let log = InMemoryEventLog::new();
        log.create_run(RunRecord::new("Counter", json!({}))).await.unwrap();
        let run_id = log.list_runs(None, None).await.unwrap()[0].run_id.clone();

        let err = log.append(&run_id, "token-a", heartbeat(&run_id)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::OwnershipConflict(_)));

        log.acquire_owner(&run_id, "token-a").await.unwrap();
        log.append(&run_id, "token-a", heartbeat(&run_id)).await.unwrap();

        let err = log.append(&run_id, "token-b", heartbeat(&run_id)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::OwnershipConflict(_)));
    }

    #[tokio::test]
    async fn terminal_events_block_further_appends() {
        let log = InMemoryEventLog::new();
        log.create_run(RunRecord::new("Counter", json!({}))).await.unwrap();
        let run_id = log.list_runs(None, None).await.unwrap()[0].run_id.clone();
        log.acquire_owner(&run_id, "t").await.unwrap();

        log.append(
            &run_id,
            "t",
            Event::Complete {
                run_id: run_id.clone(),
                options: json!({}),
                final_state: json!({}),
                ts: Utc::now(),
            },
        )
        .await
        .unwrap();

        let err = log.append(&run_id, "t", heartbeat(&run_id)).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Terminal(_)));
    }

    #[tokio::test]
    async fn read_from_offset_skips_prefix() {
        let log = InMemoryEventLog::new();
        log.create_run(RunRecord::new("Counter", json!({}))).await.unwrap();
        let run_id = log.list_runs(None, None).await.unwrap()[0].run_id.clone();
        log.acquire_owner(&run_id, "t").await.unwrap();

        for _ in 0..3 {
            log.append(&run_id, "t", heartbeat(&run_id)).await.unwrap();
        }

        assert_eq!(log.read_from(&run_id, 0).await.unwrap().len(), 3);
        assert_eq!(log.read_from(&run_id, 2).await.unwrap().len(), 1);
        assert_eq!(log.len(&run_id).await.unwrap(), 3);
    }
}
