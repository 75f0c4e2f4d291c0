use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared context accumulated across a run's steps — a JSON-compatible
/// key-value store. Later steps read keys written by earlier steps.
pub type Context = HashMap<String, serde_json::Value>;

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RunStatus {
    /// Terminal runs are never mutated by the engine again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid status '{0}', expected queued|running|succeeded|failed|canceled")]
pub struct ParseStatusError(String);

impl FromStr for RunStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "canceled" => Ok(RunStatus::Canceled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Status of an individual step within a run. Transitions only move
/// forward (`pending → running → succeeded | failed`); a failed step
/// returns to `pending` only through an explicit retry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The active lease on a run, or absent when unleased. A lease whose
/// `expires_at` has passed counts as absent — crashed runners self-heal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub by: String,
    pub at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One unit of work inside a run, bound to an agent capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_id: String,
    /// Integer rank; steps execute in ascending order.
    pub order: i64,
    pub agent_type: String,
    pub instruction: String,
    pub status: StepStatus,
    /// Count of execution attempts so far; bumped exactly once per
    /// attempt, success or failure.
    pub attempts: u32,
    /// Cooldown deadline; the step must not run again before this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A persistent record of one workflow execution: ordered steps, the
/// accumulated context, the step cursor, and the lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    pub context: Context,
    /// Index of the next step eligible for execution. Monotonically
    /// non-decreasing while the run is active.
    pub next_step_index: usize,
    /// Earliest instant the advancer should look at this run again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_runnable_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lease>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once any backoff cooldown on the run has elapsed.
    pub fn is_runnable_at(&self, now: DateTime<Utc>) -> bool {
        self.next_runnable_at.is_none_or(|at| at <= now)
    }

    /// Normalize a launch request into a run record: steps sorted by
    /// ascending order, missing fields defaulted. The engine itself
    /// never creates runs; this is the shape launch collaborators store.
    pub fn from_launch(req: LaunchRequest, now: DateTime<Utc>) -> Self {
        let mut steps: Vec<Step> = req
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, s)| Step {
                step_id: s.step_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                order: s.order.unwrap_or(index as i64),
                agent_type: s.agent_type,
                instruction: s.instruction,
                status: s.status.unwrap_or(StepStatus::Pending),
                attempts: s.attempts.unwrap_or(0),
                next_attempt_at: None,
                output: None,
                error: None,
            })
            .collect();
        steps.sort_by_key(|s| s.order);

        Run {
            id: Uuid::new_v4().to_string(),
            workspace_id: req.workspace_id,
            name: req.name,
            status: RunStatus::Queued,
            steps,
            context: req.context.unwrap_or_default(),
            next_step_index: 0,
            next_runnable_at: None,
            lock: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Launch request shape consumed from external collaborators
/// (onboarding flows, founder dashboards, API clients).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<LaunchStep>,
    #[serde(default)]
    pub context: Option<Context>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchStep {
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    pub agent_type: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub attempts: Option<u32>,
}
