use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::types::{Run, RunStatus};
use crate::storage::{RunMutation, RunStore, TxOutcome};

/// In-memory run store. Holds records only for the lifetime of the
/// instance; the map mutex makes every mutation a compare-and-set.
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, Run>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, run: &Run) -> Result<()> {
        self.runs
            .lock()
            .unwrap()
            .insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        Ok(self.runs.lock().unwrap().get(run_id).cloned())
    }

    async fn mutate_run(&self, run_id: &str, mutation: RunMutation<'_>) -> Result<TxOutcome> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(run_id) else {
            return Ok(TxOutcome::NotFound);
        };
        // Apply to a scratch copy so a rejected mutation leaves no trace.
        let mut candidate = run.clone();
        if mutation(&mut candidate) {
            *run = candidate;
            Ok(TxOutcome::Committed)
        } else {
            Ok(TxOutcome::Rejected)
        }
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> Result<Vec<Run>> {
        let runs = self.runs.lock().unwrap();
        let mut out: Vec<Run> = runs
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_runnable(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        let runs = self.runs.lock().unwrap();
        let mut eligible: Vec<&Run> = runs
            .values()
            .filter(|r| !r.is_terminal() && r.is_runnable_at(now))
            .collect();
        eligible.sort_by_key(|r| (r.next_runnable_at, r.created_at));
        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|r| r.id.clone())
            .collect())
    }

    async fn delete_run(&self, run_id: &str) -> Result<()> {
        self.runs.lock().unwrap().remove(run_id);
        Ok(())
    }
}
