use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::engine::types::Lease;
use crate::storage::{RunStore, TxOutcome};

/// Reference lease duration.
pub const DEFAULT_LEASE_MS: i64 = 25_000;

/// Result of a lease acquisition attempt. Contention is an expected
/// outcome, not an error — the run gets revisited next polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Acquired,
    /// Another runner holds an unexpired lease.
    Locked,
    NotFound,
}

/// Acquires and releases the time-bounded exclusive lease on a run.
///
/// The lease is the sole mutual-exclusion mechanism in the engine: a run
/// may only be advanced by the runner currently holding it. Expired
/// leases count as unheld, so a runner that crashes without releasing
/// never wedges the run past `expires_at`.
pub struct LeaseManager {
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    lease_ms: i64,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn RunStore>, clock: Arc<dyn Clock>, lease_ms: i64) -> Self {
        Self {
            store,
            clock,
            lease_ms,
        }
    }

    /// Claim the run for `runner_id`. Runs as a single conditional
    /// update: the claim is written only if no unexpired lease exists.
    pub async fn acquire(&self, run_id: &str, runner_id: &str) -> Result<LeaseOutcome> {
        let now = self.clock.now();
        let expires_at = now + Duration::milliseconds(self.lease_ms);

        let outcome = self
            .store
            .mutate_run(run_id, &mut |run| {
                if let Some(lock) = &run.lock
                    && !lock.is_expired(now)
                {
                    return false;
                }
                run.lock = Some(Lease {
                    by: runner_id.to_string(),
                    at: now,
                    expires_at,
                });
                run.updated_at = now;
                true
            })
            .await?;

        Ok(match outcome {
            TxOutcome::Committed => {
                debug!(run_id = %run_id, runner_id = %runner_id, "lease acquired");
                LeaseOutcome::Acquired
            }
            TxOutcome::Rejected => LeaseOutcome::Locked,
            TxOutcome::NotFound => LeaseOutcome::NotFound,
        })
    }

    /// Clear the lease if `runner_id` still holds it. If the lease
    /// expired and was reclaimed by someone else, the release is a
    /// no-op — never clobber another holder's claim.
    pub async fn release(&self, run_id: &str, runner_id: &str) -> Result<()> {
        let now = self.clock.now();

        self.store
            .mutate_run(run_id, &mut |run| match &run.lock {
                Some(lock) if lock.by == runner_id => {
                    run.lock = None;
                    run.updated_at = now;
                    true
                }
                _ => false,
            })
            .await?;

        Ok(())
    }
}
