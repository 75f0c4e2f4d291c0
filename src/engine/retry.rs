use anyhow::Result;
use tracing::info;

use crate::clock::Clock;
use crate::engine::types::{RunStatus, StepStatus};
use crate::storage::{RunStore, TxOutcome};

/// Result of a retry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The step was reset and the run is immediately eligible.
    Requeued,
    NotFound,
    /// The resolved target index does not exist in the run.
    InvalidStep { index: usize },
}

/// Clear a step's cooldown and re-queue its run for immediate pickup,
/// bypassing any outstanding backoff window. With no `step_index` the
/// run's current cursor position is targeted.
///
/// Does not execute anything itself — it only makes the run eligible.
/// Idempotent: repeating the request before a pickup changes nothing.
pub async fn request_retry(
    store: &dyn RunStore,
    clock: &dyn Clock,
    run_id: &str,
    step_index: Option<usize>,
) -> Result<RetryOutcome> {
    let now = clock.now();

    // The index actually targeted, after falling back to the cursor.
    let mut resolved = step_index.unwrap_or(0);
    let outcome = store
        .mutate_run(run_id, &mut |run| {
            let index = step_index.unwrap_or(run.next_step_index);
            resolved = index;
            let Some(step) = run.steps.get_mut(index) else {
                return false;
            };
            step.status = StepStatus::Pending;
            step.next_attempt_at = None;
            run.status = RunStatus::Queued;
            run.next_runnable_at = Some(now);
            run.updated_at = now;
            true
        })
        .await?;

    Ok(match outcome {
        TxOutcome::Committed => {
            info!(run_id = %run_id, step = ?step_index, "retry requested, run requeued");
            RetryOutcome::Requeued
        }
        TxOutcome::Rejected => RetryOutcome::InvalidStep { index: resolved },
        TxOutcome::NotFound => RetryOutcome::NotFound,
    })
}
