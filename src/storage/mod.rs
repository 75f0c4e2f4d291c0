pub mod json_store;
pub mod memory_store;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::types::{Run, RunStatus};

/// A conditional mutation applied to one run inside the store's
/// transaction. Returning `false` aborts the write.
pub type RunMutation<'a> = &'a mut (dyn FnMut(&mut Run) -> bool + Send);

/// Outcome of a conditional run update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// The mutation was applied and persisted.
    Committed,
    /// The mutation declined; nothing was written.
    Rejected,
    /// No run with that id.
    NotFound,
}

/// Trait for durable run persistence.
///
/// `mutate_run` is the only concurrency-control primitive the engine
/// relies on: it must be a true atomic read-modify-write, not a
/// read-then-write with a window for a race. Lease acquisition, step
/// state transitions, and retry requests all go through it.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run record (launch path, external to the engine core).
    async fn create_run(&self, run: &Run) -> Result<()>;

    /// Fetch a run by id.
    async fn get_run(&self, run_id: &str) -> Result<Option<Run>>;

    /// Atomic conditional update of one run.
    async fn mutate_run(&self, run_id: &str, mutation: RunMutation<'_>) -> Result<TxOutcome>;

    /// List runs, optionally filtered by status, newest first.
    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<Run>>;

    /// Ids of non-terminal runs whose cooldown (if any) has elapsed,
    /// soonest-eligible first. Feeds the polling runner.
    async fn list_runnable(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>>;

    /// Delete a run record.
    async fn delete_run(&self, run_id: &str) -> Result<()>;
}
