//! The `EventLog` trait: the storage seam the execution engine is built against.
//!
//! A real deployment backs this with a durable key/value log (the `storage
//! backend` named as an external collaborator in scope notes); this crate ships
//! only the trait and an in-memory reference implementation for tests and local
//! development.
//!
//! # Invariants implementations must uphold
//!
//! - **Append-only.** `append` never mutates or reorders previously stored events.
//! - **At-most-one owner.** `append` MUST fail with [`CheckpointError::OwnershipConflict`]
//!   if the caller does not hold the run's current owner token.
//! - **Terminal quiescence.** `append` MUST fail with [`CheckpointError::Terminal`]
//!   once a terminal event (`COMPLETE|ERROR|KILLED`) has been stored.

use async_trait::async_trait;
use brains_types::{Event, RunRecord, RunStatus};

use crate::error::Result;

/// Durable storage for one run's metadata and event log.
///
/// Implementations must be `Send + Sync`: the supervisor may hold an `Arc<dyn
/// EventLog>` shared across many concurrently-running owners, one per run.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Create a new run record. Errors if a run with this id already exists.
    async fn create_run(&self, record: RunRecord) -> Result<()>;

    /// Fetch a run's metadata, or `None` if it does not exist.
    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Update a run's status and, for terminal statuses, its completion time.
    async fn set_run_status(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// List runs, optionally filtered to one brain, newest first.
    async fn list_runs(&self, brain_title: Option<&str>, limit: Option<usize>) -> Result<Vec<RunRecord>>;

    /// Claim exclusive append rights to a run for `owner_token`. A supervisor
    /// resuming a run after a restart must reacquire this before it may write.
    async fn acquire_owner(&self, run_id: &str, owner_token: &str) -> Result<()>;

    /// Release ownership, e.g. when a run suspends into `WAITING` or `PAUSED`
    /// and the supervisor's executor is about to be torn down.
    async fn release_owner(&self, run_id: &str, owner_token: &str) -> Result<()>;

    /// Append one event, returning its 0-based sequence number in the log.
    async fn append(&self, run_id: &str, owner_token: &str, event: Event) -> Result<u64>;

    /// Read every event for a run, in append order.
    async fn read_all(&self, run_id: &str) -> Result<Vec<Event>>;

    /// Read events from `offset` (inclusive) onward, for live-feed catch-up.
    async fn read_from(&self, run_id: &str, offset: u64) -> Result<Vec<Event>>;

    /// Total number of events stored for a run.
    async fn len(&self, run_id: &str) -> Result<u64>;
}
