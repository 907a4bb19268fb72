//! Request-level lifecycle tests.
//!
//! These drive a scripted backend through the whole pipeline and then walk
//! the resulting plan with an [`ExecutionLedger`], the way an executor would.

use std::sync::Arc;

use pilot::authority::{ConfiguredEligibility, NoDefaults};
use pilot::core::ledger::{ExecutionLedger, GoalOutcome, NodeOutcome};
use pilot::core::plan::{FailureKind, OrchestrationStatus};
use pilot::core::planner::WorldState;
use pilot::io::backend::OutputSchema;
use pilot::io::config::{EligibilityConfig, default_tools};
use pilot::io::registry::ToolRegistry;
use pilot::pipeline::{Pipeline, PipelineStatus};
use pilot::test_support::{ScriptedBackend, goal_json, interpreter_answer, resolver_answer};

const REQUEST: &str = "search the web for rust lifetimes, then copy the results, then open slack";

fn pipeline(backend: &Arc<ScriptedBackend>, tools: ToolRegistry) -> Pipeline {
    Pipeline::new(
        backend.clone(),
        Box::new(NoDefaults),
        Box::new(ConfiguredEligibility::new(&EligibilityConfig::default())),
        tools,
        WorldState::default(),
    )
    .expect("pipeline")
}

fn script_request(backend: &ScriptedBackend) {
    backend.push(
        OutputSchema::Interpreter,
        Ok(interpreter_answer(vec![
            goal_json("search", "browser", "search", Some("rust lifetimes"), "root"),
            goal_json("copy", "clipboard", "copy", Some("results"), "after:search"),
            goal_json("chat", "apps", "launch", Some("slack"), "root"),
        ])),
    );
}

/// Full lifecycle: plan three goals, then execute with one failing node.
///
/// ```text
/// g0.a1 (open search page) -> g0.a2 (search) -> g1.a1 (copy)
/// g2.a1 (launch slack)
/// ```
///
/// Failing `g0.a2` must skip the copy but leave the launch untouched.
#[test]
fn planned_request_executes_with_failure_isolation() {
    let backend = Arc::new(ScriptedBackend::new());
    script_request(&backend);
    for tool in [
        "browser.open_url",
        "browser.search_web",
        "clipboard.write_text",
        "apps.launch",
    ] {
        backend.push(OutputSchema::Resolver, Ok(resolver_answer(tool, 0.9)));
    }

    let outcome = pipeline(&backend, ToolRegistry::new(default_tools()))
        .run(REQUEST)
        .expect("run");
    assert_eq!(outcome.status, PipelineStatus::Success);
    assert_eq!(
        outcome.plan.tools(),
        vec![
            "browser.open_url".to_string(),
            "browser.search_web".to_string(),
            "clipboard.write_text".to_string(),
            "apps.launch".to_string(),
        ]
    );
    assert_eq!(outcome.plan.steps[2].args["content"], "results");
    // The gate settled the topology on its own.
    assert_eq!(backend.calls(OutputSchema::Gate), 0);

    let graph = &outcome.plan.graph;
    let mut ledger = ExecutionLedger::new(graph);
    let mut executed = Vec::new();
    while !ledger.is_finished() {
        let ready = ledger.next_ready();
        assert!(!ready.is_empty(), "ledger stalled");
        for node in ready {
            let result = if node == "g0.a2" {
                NodeOutcome::Failed("search page did not load".to_string())
            } else {
                NodeOutcome::Completed
            };
            ledger.record(node, result).expect("record");
            executed.push(node.to_string());
        }
    }

    assert!(!executed.contains(&"g1.a1".to_string()));
    let summary = ledger.summary();
    assert!(matches!(summary.goals[&0], GoalOutcome::Failed { .. }));
    assert!(matches!(summary.goals[&1], GoalOutcome::Skipped { .. }));
    assert_eq!(summary.goals[&2], GoalOutcome::Completed);
    assert_eq!(summary.status(), Some(OrchestrationStatus::Partial));
}

/// Removing a domain from the registry turns its goals into planning failures
/// and drops cached resolutions.
#[test]
fn replacing_registry_removes_capabilities() {
    let backend = Arc::new(ScriptedBackend::new());
    let without_apps: Vec<_> = default_tools()
        .into_iter()
        .filter(|tool| !tool.name.starts_with("apps."))
        .collect();
    let mut pipeline = pipeline(&backend, ToolRegistry::new(default_tools()));
    pipeline.replace_registry(ToolRegistry::new(without_apps));

    script_request(&backend);
    for tool in [
        "browser.open_url",
        "browser.search_web",
        "clipboard.write_text",
    ] {
        backend.push(OutputSchema::Resolver, Ok(resolver_answer(tool, 0.9)));
    }

    let outcome = pipeline.run(REQUEST).expect("run");
    assert_eq!(outcome.status, PipelineStatus::Partial);
    assert_eq!(outcome.succeeded, vec![0, 1]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].goal_id, "chat");
    assert_eq!(outcome.failed[0].kind, FailureKind::Failed);
    assert!(outcome.failed[0].reason.contains("apps"));
    assert_eq!(backend.calls(OutputSchema::Resolver), 3);
}
