use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::engine::types::{LaunchRequest, Run, RunStatus};
use crate::engine::{AdvanceOutcome, RetryOutcome, request_retry};

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchResponse {
    pub run_id: String,
    pub status: String,
    pub step_count: usize,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    #[serde(default)]
    pub step_index: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub run_id: String,
    pub outcome: String,
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    pub workspace: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_type: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// --- Handlers ---

/// POST /runs — normalize a launch request and persist the new run.
pub async fn launch_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>, AppError> {
    if req.steps.is_empty() {
        return Err(AppError::BadRequest(
            "A run needs at least one step".to_string(),
        ));
    }

    let run = Run::from_launch(req, state.clock.now());
    state.store.create_run(&run).await?;

    Ok(Json(LaunchResponse {
        run_id: run.id,
        status: run.status.to_string(),
        step_count: run.steps.len(),
    }))
}

/// GET /runs — summary view, optionally filtered by status or workspace.
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRunsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status_filter: Option<RunStatus> = params
        .status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: crate::engine::types::ParseStatusError| AppError::BadRequest(e.to_string()))?;

    let runs = state.store.list_runs(status_filter).await?;

    let summaries: Vec<serde_json::Value> = runs
        .iter()
        .filter(|r| {
            params
                .workspace
                .as_deref()
                .is_none_or(|w| r.workspace_id == w)
        })
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "workspaceId": r.workspace_id,
                "name": r.name,
                "status": r.status,
                "nextStepIndex": r.next_step_index,
                "stepCount": r.steps.len(),
                "createdAt": r.created_at,
                "updatedAt": r.updated_at,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "runs": summaries,
        "total": summaries.len(),
    })))
}

/// GET /runs/{id} — full run projection for dashboards.
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Run>, AppError> {
    let run = state
        .store
        .get_run(&id)
        .await?
        .ok_or_else(|| AppError::run_not_found(&id))?;

    Ok(Json(run))
}

/// DELETE /runs/{id}
pub async fn delete_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .store
        .get_run(&id)
        .await?
        .ok_or_else(|| AppError::run_not_found(&id))?;

    state.store.delete_run(&id).await?;

    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /runs/{id}/advance — drive one advancer cycle for this run.
/// Lease contention and cooldowns are reported, not failed.
pub async fn advance_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let outcome = state.advancer.advance(&id).await?;

    if outcome == AdvanceOutcome::NotFound {
        return Err(AppError::run_not_found(&id));
    }

    let outcome = match outcome {
        AdvanceOutcome::CoolingDown => "cooling_down",
        AdvanceOutcome::LeaseHeld => "lease_held",
        AdvanceOutcome::Terminal => "terminal",
        AdvanceOutcome::RunSucceeded => "run_succeeded",
        AdvanceOutcome::StepSucceeded => "step_succeeded",
        AdvanceOutcome::StepFailed => "step_failed",
        AdvanceOutcome::NotFound => unreachable!(),
    };

    Ok(Json(AdvanceResponse {
        run_id: id,
        outcome: outcome.to_string(),
    }))
}

/// POST /runs/{id}/retry — clear a step's cooldown and requeue the run
/// for immediate pickup. Does not execute the step.
pub async fn retry_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<RetryRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let step_index = body.and_then(|Json(req)| req.step_index);

    match request_retry(state.store.as_ref(), state.clock.as_ref(), &id, step_index).await? {
        RetryOutcome::Requeued => Ok(Json(serde_json::json!({ "ok": true }))),
        RetryOutcome::NotFound => Err(AppError::run_not_found(&id)),
        RetryOutcome::InvalidStep { index } => Err(AppError::invalid_step(index)),
    }
}

/// POST /runs/{id}/cancel — external cancellation. Terminal runs are
/// left untouched.
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let now = state.clock.now();
    let outcome = state
        .store
        .mutate_run(&id, &mut |run| {
            if run.is_terminal() {
                return false;
            }
            run.status = RunStatus::Canceled;
            run.next_runnable_at = None;
            run.updated_at = now;
            true
        })
        .await?;

    match outcome {
        crate::storage::TxOutcome::Committed => Ok(Json(serde_json::json!({ "canceled": id }))),
        crate::storage::TxOutcome::Rejected => Err(AppError::BadRequest(
            "Run has already reached a terminal status".to_string(),
        )),
        crate::storage::TxOutcome::NotFound => Err(AppError::run_not_found(&id)),
    }
}

/// GET /agents
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let agents: Vec<AgentInfo> = state
        .registry
        .list()
        .iter()
        .map(|(name, desc)| AgentInfo {
            agent_type: name.to_string(),
            description: desc.to_string(),
        })
        .collect();

    let total = agents.len();
    Json(serde_json::json!({
        "agents": agents,
        "total": total,
    }))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
