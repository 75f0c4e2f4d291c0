use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::engine::{AdvanceOutcome, RunAdvancer};
use crate::storage::RunStore;

/// Polls the store for eligible runs and advances each by one step.
///
/// Any number of runner processes may poll the same store; the per-run
/// lease keeps them from advancing the same run concurrently, so lease
/// contention here is silently skipped rather than treated as an error.
pub struct Runner {
    advancer: Arc<RunAdvancer>,
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    poll_interval: std::time::Duration,
    batch_size: usize,
    max_concurrent_runs: usize,
}

impl Runner {
    pub fn new(
        advancer: Arc<RunAdvancer>,
        store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        poll_interval: std::time::Duration,
        batch_size: usize,
        max_concurrent_runs: usize,
    ) -> Self {
        Self {
            advancer,
            store,
            clock,
            poll_interval,
            batch_size,
            max_concurrent_runs: max_concurrent_runs.max(1),
        }
    }

    /// One polling cycle: advance every currently-eligible run once.
    /// Returns how many runs made progress (a step executed or the run
    /// completed).
    pub async fn tick(&self) -> Result<usize> {
        let now = self.clock.now();
        let candidates = self.store.list_runnable(now, self.batch_size).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_runs));
        let mut handles = Vec::new();

        for run_id in candidates {
            let advancer = self.advancer.clone();
            let semaphore = semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();
                match advancer.advance(&run_id).await {
                    Ok(outcome) => {
                        debug!(run_id = %run_id, outcome = ?outcome, "advanced run");
                        matches!(
                            outcome,
                            AdvanceOutcome::StepSucceeded
                                | AdvanceOutcome::StepFailed
                                | AdvanceOutcome::RunSucceeded
                        )
                    }
                    Err(e) => {
                        error!(run_id = %run_id, error = %e, "failed to advance run");
                        false
                    }
                }
            }));
        }

        let mut progressed = 0;
        for handle in handles {
            if handle.await? {
                progressed += 1;
            }
        }

        Ok(progressed)
    }

    /// Poll until the task is aborted.
    pub async fn run_forever(&self) -> Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "runner started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "runner tick failed");
            }
        }
    }
}
