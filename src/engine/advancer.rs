use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use chrono::Duration;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use crate::agents::{AgentArgs, AgentRegistry};
use crate::clock::Clock;
use crate::engine::EngineConfig;
use crate::engine::backoff::BackoffPolicy;
use crate::engine::lease::{LeaseManager, LeaseOutcome};
use crate::engine::types::{Run, RunStatus, StepStatus};
use crate::storage::{RunStore, TxOutcome};

/// What one advancer invocation did with a run. Everything here is an
/// expected outcome; only store failures surface as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A backoff cooldown is still open; nothing was attempted.
    CoolingDown,
    /// Another runner holds an unexpired lease.
    LeaseHeld,
    NotFound,
    /// The run already reached a terminal status.
    Terminal,
    /// The cursor moved past the last step; run marked succeeded.
    RunSucceeded,
    StepSucceeded,
    StepFailed,
}

/// A writer must still be the live lease holder: the run has not gone
/// terminal under it, and the lease has not been reclaimed. Every write
/// the advancer makes under the lease re-checks this inside the store
/// transaction, so a cancel or reclaim committed while the executor was
/// running wins over the advancer's stale write.
fn may_write(run: &Run, runner_id: &str) -> bool {
    !run.is_terminal() && run.lock.as_ref().is_some_and(|l| l.by == runner_id)
}

/// The core control loop: advances a leased run by exactly one step per
/// invocation, then releases the lease.
///
/// Steps within one run execute strictly in ascending order, one at a
/// time — they may have data dependencies through the context. Across
/// runs nothing is ordered; correctness under concurrent runners rests
/// entirely on the per-run lease.
pub struct RunAdvancer {
    registry: Arc<AgentRegistry>,
    store: Arc<dyn RunStore>,
    clock: Arc<dyn Clock>,
    leases: LeaseManager,
    backoff: BackoffPolicy,
    rng: Mutex<StdRng>,
    runner_id: String,
    step_timeout: Option<std::time::Duration>,
}

impl RunAdvancer {
    pub fn new(
        registry: Arc<AgentRegistry>,
        store: Arc<dyn RunStore>,
        clock: Arc<dyn Clock>,
        runner_id: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        let leases = LeaseManager::new(store.clone(), clock.clone(), config.lease_ms);
        Self {
            registry,
            store,
            clock,
            leases,
            backoff: BackoffPolicy {
                base_delay_ms: config.base_delay_ms,
                max_delay_ms: config.max_delay_ms,
            },
            rng: Mutex::new(StdRng::from_os_rng()),
            runner_id: runner_id.into(),
            step_timeout: config.step_timeout_ms.map(std::time::Duration::from_millis),
        }
    }

    /// Replace the jitter source with a seeded one, making the scheduled
    /// `next_attempt_at` of failing steps reproducible.
    pub fn with_rng(self, rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            ..self
        }
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    /// Advance the run by one step: eligibility check, lease, execute,
    /// persist, release. The lease is released on every path, including
    /// executor failure.
    pub async fn advance(&self, run_id: &str) -> Result<AdvanceOutcome> {
        // Cheap pre-checks before taking the lease.
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(AdvanceOutcome::NotFound);
        };
        if run.is_terminal() {
            return Ok(AdvanceOutcome::Terminal);
        }
        if !run.is_runnable_at(self.clock.now()) {
            return Ok(AdvanceOutcome::CoolingDown);
        }

        match self.leases.acquire(run_id, &self.runner_id).await? {
            LeaseOutcome::Locked => return Ok(AdvanceOutcome::LeaseHeld),
            LeaseOutcome::NotFound => return Ok(AdvanceOutcome::NotFound),
            LeaseOutcome::Acquired => {}
        }

        let outcome = self.advance_leased(run_id).await;

        if let Err(e) = self.leases.release(run_id, &self.runner_id).await {
            error!(run_id = %run_id, error = %e, "failed to release lease");
        }

        outcome
    }

    /// Classify a guarded write the store rejected: the run either went
    /// terminal under us or the lease was reclaimed mid-execution.
    async fn refusal_outcome(&self, run_id: &str) -> Result<AdvanceOutcome> {
        match self.store.get_run(run_id).await? {
            None => Ok(AdvanceOutcome::NotFound),
            Some(run) if run.is_terminal() => Ok(AdvanceOutcome::Terminal),
            Some(_) => Ok(AdvanceOutcome::LeaseHeld),
        }
    }

    /// The body of one advance cycle, entered with the lease held.
    async fn advance_leased(&self, run_id: &str) -> Result<AdvanceOutcome> {
        // Re-read inside the lease window: the run may have been
        // canceled between the eligibility check and acquisition.
        let Some(run) = self.store.get_run(run_id).await? else {
            return Ok(AdvanceOutcome::NotFound);
        };
        if run.is_terminal() {
            return Ok(AdvanceOutcome::Terminal);
        }

        let now = self.clock.now();
        let step_index = run.next_step_index;

        let Some(step) = run.steps.get(step_index) else {
            // Cursor past the end — nothing left to execute.
            let tx = self
                .store
                .mutate_run(run_id, &mut |run| {
                    if !may_write(run, &self.runner_id) {
                        return false;
                    }
                    run.status = RunStatus::Succeeded;
                    run.next_runnable_at = None;
                    run.updated_at = now;
                    true
                })
                .await?;
            return match tx {
                TxOutcome::Committed => {
                    info!(run_id = %run_id, "run complete");
                    Ok(AdvanceOutcome::RunSucceeded)
                }
                TxOutcome::Rejected => self.refusal_outcome(run_id).await,
                TxOutcome::NotFound => Ok(AdvanceOutcome::NotFound),
            };
        };

        // A lease race can expose a step whose cooldown has not elapsed.
        if let Some(at) = step.next_attempt_at
            && at > now
        {
            return Ok(AdvanceOutcome::CoolingDown);
        }

        let step_id = step.step_id.clone();
        let agent_type = step.agent_type.clone();
        let args = AgentArgs {
            workspace_id: run.workspace_id.clone(),
            instruction: step.instruction.clone(),
            context: run.context.clone(),
            step_index,
            step_id: step_id.clone(),
        };

        // Record the attempt before the executor runs, so attempts
        // counts every try whether or not it returns.
        let mut attempts = 0;
        let tx = self
            .store
            .mutate_run(run_id, &mut |run| {
                if !may_write(run, &self.runner_id) {
                    return false;
                }
                let Some(step) = run.steps.get_mut(step_index) else {
                    return false;
                };
                step.status = StepStatus::Running;
                step.attempts += 1;
                attempts = step.attempts;
                run.status = RunStatus::Running;
                run.updated_at = now;
                true
            })
            .await?;
        match tx {
            TxOutcome::Committed => {}
            TxOutcome::Rejected => return self.refusal_outcome(run_id).await,
            TxOutcome::NotFound => return Ok(AdvanceOutcome::NotFound),
        }

        info!(
            run_id = %run_id,
            step = step_index,
            agent = %agent_type,
            attempt = attempts,
            "executing step"
        );

        let agent = self.registry.resolve(&agent_type);
        let result = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, agent.execute(args)).await {
                Ok(r) => r,
                Err(_) => Err(anyhow!("step timed out after {:?}", limit)),
            },
            None => agent.execute(args).await,
        };

        let now = self.clock.now();
        match result {
            Ok(outcome) => {
                let step_count = run.steps.len();
                let tx = self
                    .store
                    .mutate_run(run_id, &mut |run| {
                        if !may_write(run, &self.runner_id) {
                            return false;
                        }
                        let Some(step) = run.steps.get_mut(step_index) else {
                            return false;
                        };
                        step.status = StepStatus::Succeeded;
                        step.output = Some(outcome.output.clone());
                        step.error = None;
                        step.next_attempt_at = None;
                        // Shallow merge; later keys win.
                        if let Some(patch) = &outcome.context_patch {
                            for (k, v) in patch {
                                run.context.insert(k.clone(), v.clone());
                            }
                        }
                        run.next_step_index = step_index + 1;
                        run.next_runnable_at = None;
                        run.status = if run.next_step_index >= step_count {
                            RunStatus::Succeeded
                        } else {
                            RunStatus::Queued
                        };
                        run.updated_at = now;
                        true
                    })
                    .await?;

                match tx {
                    TxOutcome::Committed => {
                        info!(run_id = %run_id, step = step_index, "step succeeded");
                        Ok(AdvanceOutcome::StepSucceeded)
                    }
                    TxOutcome::Rejected => self.refusal_outcome(run_id).await,
                    TxOutcome::NotFound => Ok(AdvanceOutcome::NotFound),
                }
            }
            Err(e) => {
                // A step failure is retryable, not fatal: schedule the
                // cooldown and leave the run eligible for future pickup.
                let delay_ms = {
                    let mut rng = self.rng.lock().unwrap();
                    self.backoff.delay_ms(attempts, &mut *rng)
                };
                let next_attempt_at = now + Duration::milliseconds(delay_ms as i64);
                let err_msg = format!("{:#}", e);

                warn!(
                    run_id = %run_id,
                    step = step_index,
                    attempt = attempts,
                    delay_ms = delay_ms,
                    error = %err_msg,
                    "step failed, retry scheduled"
                );

                let tx = self
                    .store
                    .mutate_run(run_id, &mut |run| {
                        if !may_write(run, &self.runner_id) {
                            return false;
                        }
                        let Some(step) = run.steps.get_mut(step_index) else {
                            return false;
                        };
                        step.status = StepStatus::Failed;
                        step.error = Some(err_msg.clone());
                        step.next_attempt_at = Some(next_attempt_at);
                        run.next_runnable_at = Some(next_attempt_at);
                        run.updated_at = now;
                        true
                    })
                    .await?;

                match tx {
                    TxOutcome::Committed => Ok(AdvanceOutcome::StepFailed),
                    TxOutcome::Rejected => self.refusal_outcome(run_id).await,
                    TxOutcome::NotFound => Ok(AdvanceOutcome::NotFound),
                }
            }
        }
    }
}
