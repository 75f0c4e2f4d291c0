//! Tests for run/step types and launch normalization.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};

use stepline::engine::types::{LaunchRequest, LaunchStep, Run, RunStatus, StepStatus};

fn launch_step(agent_type: &str, order: Option<i64>) -> LaunchStep {
    LaunchStep {
        step_id: None,
        order,
        agent_type: agent_type.to_string(),
        instruction: String::new(),
        status: None,
        attempts: None,
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

#[test]
fn launch_sorts_steps_by_order() {
    let run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "sorting".to_string(),
            steps: vec![
                launch_step("c", Some(30)),
                launch_step("a", Some(10)),
                launch_step("b", Some(20)),
            ],
            context: None,
        },
        now(),
    );

    let types: Vec<&str> = run.steps.iter().map(|s| s.agent_type.as_str()).collect();
    assert_eq!(types, vec!["a", "b", "c"]);
}

#[test]
fn launch_defaults_missing_fields() {
    let run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "defaults".to_string(),
            steps: vec![launch_step("x", None), launch_step("y", None)],
            context: None,
        },
        now(),
    );

    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.next_step_index, 0);
    assert!(run.next_runnable_at.is_none());
    assert!(run.lock.is_none());
    assert_eq!(run.created_at, now());

    // Missing order falls back to the array index.
    assert_eq!(run.steps[0].order, 0);
    assert_eq!(run.steps[1].order, 1);

    let ids: HashSet<&str> = run.steps.iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids.len(), 2, "assigned step ids must be unique");

    for s in &run.steps {
        assert_eq!(s.status, StepStatus::Pending);
        assert_eq!(s.attempts, 0);
        assert!(s.next_attempt_at.is_none());
    }
}

#[test]
fn launch_preserves_explicit_fields() {
    let run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "explicit".to_string(),
            steps: vec![LaunchStep {
                step_id: Some("s-custom".to_string()),
                order: Some(7),
                agent_type: "x".to_string(),
                instruction: "do it".to_string(),
                status: Some(StepStatus::Pending),
                attempts: Some(3),
            }],
            context: None,
        },
        now(),
    );

    let s = &run.steps[0];
    assert_eq!(s.step_id, "s-custom");
    assert_eq!(s.order, 7);
    assert_eq!(s.attempts, 3);
}

#[test]
fn terminal_statuses() {
    assert!(!RunStatus::Queued.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Succeeded.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(RunStatus::Canceled.is_terminal());
}

#[test]
fn run_status_parses_from_str() {
    assert_eq!("queued".parse::<RunStatus>().unwrap(), RunStatus::Queued);
    assert_eq!(
        "canceled".parse::<RunStatus>().unwrap(),
        RunStatus::Canceled
    );
    assert!("bogus".parse::<RunStatus>().is_err());
}

#[test]
fn runnable_eligibility_follows_next_runnable_at() {
    let mut run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "eligibility".to_string(),
            steps: vec![launch_step("x", None)],
            context: None,
        },
        now(),
    );

    assert!(run.is_runnable_at(now()));

    run.next_runnable_at = Some(now() + chrono::Duration::seconds(30));
    assert!(!run.is_runnable_at(now()));
    assert!(run.is_runnable_at(now() + chrono::Duration::seconds(30)));
}

#[test]
fn run_serializes_with_camel_case_fields() {
    let run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "wire".to_string(),
            steps: vec![launch_step("system.echo", None)],
            context: None,
        },
        now(),
    );

    let value = serde_json::to_value(&run).unwrap();
    assert!(value.get("workspaceId").is_some());
    assert!(value.get("nextStepIndex").is_some());
    assert!(value.get("createdAt").is_some());
    assert_eq!(value["status"], "queued");

    let step = &value["steps"][0];
    assert!(step.get("stepId").is_some());
    assert!(step.get("agentType").is_some());
    assert_eq!(step["status"], "pending");
    // Absent options stay off the wire.
    assert!(step.get("nextAttemptAt").is_none());
    assert!(value.get("lock").is_none());
}

#[test]
fn run_round_trips_through_json() {
    let run = Run::from_launch(
        LaunchRequest {
            workspace_id: "ws-1".to_string(),
            name: "roundtrip".to_string(),
            steps: vec![launch_step("system.echo", Some(5))],
            context: None,
        },
        now(),
    );

    let json = serde_json::to_string(&run).unwrap();
    let back: Run = serde_json::from_str(&json).unwrap();

    assert_eq!(back.id, run.id);
    assert_eq!(back.steps[0].order, 5);
    assert_eq!(back.status, RunStatus::Queued);
}
