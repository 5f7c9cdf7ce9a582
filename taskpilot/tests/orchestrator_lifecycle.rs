//! End-to-end orchestrator scenarios driven through the public API.
//!
//! Backends and the planning collaborator are scripted; every scenario goes
//! goal -> plan -> route -> execute -> history.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use taskpilot::backend::BackendRegistry;
use taskpilot::core::types::{AbortReason, BackendKind, PlanSource, RunState};
use taskpilot::executor::ExecutorConfig;
use taskpilot::orchestrator::Orchestrator;
use taskpilot::planner::Planner;
use taskpilot::test_support::{
    ScriptedBackend, ScriptedPlanGenerator, plan_of, plan_response, registry_with, step,
};

fn orchestrator(registry: Arc<BackendRegistry>, history_capacity: usize) -> Orchestrator {
    Orchestrator::new(
        registry,
        Planner::heuristic(),
        history_capacity,
        ExecutorConfig::default(),
    )
}

#[test]
fn open_notepad_runs_one_structured_step() {
    let structured = Arc::new(ScriptedBackend::succeeding());
    let vision = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(
        registry_with(&[
            (BackendKind::Structured, structured.clone()),
            (BackendKind::Vision, vision.clone()),
        ]),
        10,
    );

    let result = orch.execute_goal("open notepad", None);

    assert!(result.overall_success);
    assert_eq!(result.completed_steps, 1);
    assert_eq!(result.total_steps, 1);
    assert_eq!(result.state, RunState::Completed);
    assert_eq!(result.step_results[0].backend_used, Some(BackendKind::Structured));
    assert_eq!(structured.calls(), vec!["open notepad"]);
    assert!(vision.calls().is_empty());
}

#[test]
fn failed_first_then_clause_skips_the_second() {
    let vision = Arc::new(ScriptedBackend::failing_on(&["click the blue button"]));
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);

    let plan = orch
        .plan("click the blue button then take a screenshot")
        .expect("plan");
    assert_eq!(plan.steps.len(), 2);
    assert!(plan.steps.iter().all(|s| s.critical));
    assert!(plan.steps.iter().all(|s| s.target_backend == BackendKind::Vision));

    let result = orch.execute_goal("click the blue button then take a screenshot", None);

    assert_eq!(vision.calls(), vec!["click the blue button"]);
    assert_eq!(result.completed_steps, 0);
    assert_eq!(result.total_steps, 2);
    assert!(!result.overall_success);
    assert_eq!(result.state, RunState::Aborted);
}

#[test]
fn critical_failure_leaves_later_steps_unattempted() {
    let vision = Arc::new(ScriptedBackend::failing_on(&["second"]));
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);
    let plan = plan_of(
        "three steps",
        vec![
            step(1, "first", BackendKind::Vision, true),
            step(2, "second", BackendKind::Vision, true),
            step(3, "third", BackendKind::Vision, false),
        ],
    );

    let result = orch.execute_plan(&plan, None).expect("execute");

    assert_eq!(vision.calls(), vec!["first", "second"]);
    assert!(result.completed_steps < result.total_steps);
    assert!(!result.overall_success);
    assert!(matches!(
        result.abort_reason,
        Some(AbortReason::CriticalStepFailed { step: 2, .. })
    ));
}

#[test]
fn non_critical_failure_still_attempts_every_step() {
    let structured = Arc::new(ScriptedBackend::failing_on(&["open chrome"]));
    let orch = orchestrator(
        registry_with(&[(BackendKind::Structured, structured.clone())]),
        10,
    );

    let result = orch.execute_goal("open chrome and close music", None);

    assert_eq!(structured.calls(), vec!["open chrome", "close music"]);
    assert_eq!(result.state, RunState::PartialFailure);
    assert_eq!(result.completed_steps, 1);
    assert_eq!(result.failed_steps, 1);
    assert!(!result.overall_success);
}

#[test]
fn routing_falls_back_to_vision_only() {
    let learning_plan = plan_of(
        "learn",
        vec![step(1, "learn my routine", BackendKind::Learning, true)],
    );

    let vision = Arc::new(ScriptedBackend::succeeding());
    let with_vision = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);
    let result = with_vision
        .execute_plan(&learning_plan, None)
        .expect("execute");
    assert!(result.overall_success);
    assert_eq!(result.step_results[0].backend_used, Some(BackendKind::Vision));

    let structured = Arc::new(ScriptedBackend::succeeding());
    let structured_only = orchestrator(
        registry_with(&[(BackendKind::Structured, structured.clone())]),
        10,
    );
    let result = structured_only.execute_goal("click the submit button", None);
    assert!(structured.calls().is_empty());
    assert_eq!(result.step_results[0].backend_used, None);
    assert_eq!(
        result.abort_reason,
        Some(AbortReason::BackendUnavailable {
            step: 1,
            backend: BackendKind::Vision
        })
    );
    let error = result.step_results[0].error.as_deref().expect("error");
    assert!(error.contains("no backend available"));
}

#[test]
fn history_keeps_the_most_recent_runs() {
    let vision = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision)]), 3);

    for i in 0..5 {
        orch.execute_goal(&format!("scroll page {i}"), None);
    }

    assert_eq!(orch.status().history_size, 3);
    let goals: Vec<String> = orch
        .history()
        .snapshot()
        .into_iter()
        .map(|entry| entry.goal)
        .collect();
    assert_eq!(goals, vec!["scroll page 2", "scroll page 3", "scroll page 4"]);
}

#[test]
fn ai_plan_is_executed_and_schema_invalid_plan_falls_back() {
    let structured = Arc::new(ScriptedBackend::succeeding());
    let registry = registry_with(&[(BackendKind::Structured, structured.clone())]);

    let generator = Arc::new(ScriptedPlanGenerator::responding(&plan_response(&[
        ("launch notes", "structured", true),
        ("close notes", "comprehensive", false),
    ])));
    let orch = Orchestrator::new(
        registry.clone(),
        Planner::with_generator(generator),
        10,
        ExecutorConfig::default(),
    );
    assert!(orch.status().ai_planning_available);
    let result = orch.execute_goal("take notes", None);
    assert!(result.overall_success);
    assert_eq!(structured.calls(), vec!["launch notes", "close notes"]);
    assert_eq!(
        orch.current_plan().expect("current plan").source,
        PlanSource::Ai
    );

    let broken = Arc::new(ScriptedPlanGenerator::responding(r#"{"steps": "many"}"#));
    let orch = Orchestrator::new(
        registry,
        Planner::with_generator(broken),
        10,
        ExecutorConfig::default(),
    );
    let plan = orch.plan("open notepad").expect("plan");
    assert_eq!(plan.source, PlanSource::Heuristic);
    assert_eq!(plan.steps[0].target_backend, BackendKind::Structured);
}

#[test]
fn nested_execution_from_progress_callback_is_rejected() {
    let vision = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);
    let mut nested = None;
    let mut progress = |_: usize, _: usize, _: &str| {
        assert!(orch.status().active_run);
        nested = Some(orch.execute_goal("scroll down", None));
    };

    let outer = orch.execute_goal("scroll up", Some(&mut progress));

    assert!(outer.overall_success);
    let nested = nested.expect("callback ran");
    assert_eq!(nested.state, RunState::Aborted);
    assert!(matches!(nested.abort_reason, Some(AbortReason::Rejected { .. })));
    assert_eq!(vision.calls(), vec!["scroll up"]);
    assert_eq!(orch.history().len(), 1);
    assert!(!orch.status().active_run);
}

#[test]
fn rejected_nested_run_keeps_the_running_plan_current() {
    let vision = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);
    let mut during = None;
    let mut progress = |_: usize, _: usize, _: &str| {
        let nested = orch.execute_goal("scroll down the page", None);
        assert!(matches!(nested.abort_reason, Some(AbortReason::Rejected { .. })));
        during = orch.current_plan().map(|plan| plan.goal);
    };

    orch.execute_goal("take a screenshot", Some(&mut progress));

    assert_eq!(during.as_deref(), Some("take a screenshot"));
    let current = orch.current_plan().expect("current plan");
    assert_eq!(current.goal, "take a screenshot");
    let last = orch.history().snapshot().pop().expect("history entry");
    assert_eq!(last.goal, current.goal);

    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("history.json");
    orch.save_history(Some(&path)).expect("save");
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).expect("read"))
        .expect("json");
    assert_eq!(doc["current_plan"]["goal"], "take a screenshot");
}

#[test]
fn cancel_between_steps_keeps_produced_results() {
    let vision = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(registry_with(&[(BackendKind::Vision, vision.clone())]), 10);
    let plan = plan_of(
        "three",
        vec![
            step(1, "one", BackendKind::Vision, true),
            step(2, "two", BackendKind::Vision, true),
            step(3, "three", BackendKind::Vision, true),
        ],
    );
    let mut progress = |index: usize, _: usize, _: &str| {
        if index == 2 {
            orch.cancel();
        }
    };

    let result = orch.execute_plan(&plan, Some(&mut progress)).expect("execute");

    assert_eq!(vision.calls(), vec!["one", "two"]);
    assert_eq!(result.step_results.len(), 2);
    assert_eq!(result.state, RunState::Aborted);
    assert_eq!(
        result.abort_reason,
        Some(AbortReason::Cancelled {
            completed_through: 2
        })
    );
}

#[test]
fn slow_step_times_out() {
    let vision = Arc::new(ScriptedBackend::succeeding().with_delay(Duration::from_secs(5)));
    let orch = Orchestrator::new(
        registry_with(&[(BackendKind::Vision, vision)]),
        Planner::heuristic(),
        10,
        ExecutorConfig {
            step_timeout: Duration::from_millis(50),
            ..ExecutorConfig::default()
        },
    );

    let result = orch.execute_goal("scroll forever", None);

    assert!(!result.overall_success);
    let error = result.step_results[0].error.as_deref().expect("error");
    assert!(error.contains("timed out"));
}

#[test]
fn saved_history_carries_backend_stats() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("history.json");
    let vision = Arc::new(ScriptedBackend::failing_on(&["scroll down"]));
    let structured = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(
        registry_with(&[
            (BackendKind::Vision, vision),
            (BackendKind::Structured, structured),
        ]),
        10,
    );

    orch.execute_goal("open notepad", None);
    orch.execute_goal("scroll down", None);
    orch.execute_goal("scroll up", None);

    orch.save_history(Some(&path)).expect("save");
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).expect("read"))
        .expect("json");
    let stats = &doc["backend_stats"];
    assert_eq!(stats["structured"]["routed"], 1);
    assert_eq!(stats["structured"]["succeeded"], 1);
    assert_eq!(stats["vision"]["routed"], 2);
    assert_eq!(stats["vision"]["failed"], 1);
    assert!(stats.get("learning").is_none());
}

#[test]
fn saved_history_has_documented_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("logs").join("history.json");
    let structured = Arc::new(ScriptedBackend::succeeding());
    let orch = orchestrator(registry_with(&[(BackendKind::Structured, structured)]), 10);
    orch.execute_goal("open notepad", None);

    let written = orch.save_history(Some(&path)).expect("save");

    assert_eq!(written, path);
    let raw = std::fs::read_to_string(&path).expect("read");
    let doc: Value = serde_json::from_str(&raw).expect("json");
    for key in ["saved_at", "status", "current_plan", "backend_stats", "history"] {
        assert!(doc.get(key).is_some(), "missing {key}");
    }
    assert_eq!(doc["status"]["history_size"], 1);
    assert_eq!(doc["status"]["backends_available"]["structured"], true);
    assert_eq!(doc["history"][0]["goal"], "open notepad");
    assert_eq!(doc["history"][0]["result"]["overall_success"], true);
    assert_eq!(doc["current_plan"]["steps"][0]["target_backend"], "structured");
}
