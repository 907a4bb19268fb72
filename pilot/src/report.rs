//! Human-readable summary of a pipeline run for the CLI.

use std::fmt::Write as _;

use crate::core::plan::FailureKind;
use crate::pipeline::{PipelineOutcome, PipelineStatus};

fn status_label(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Success => "success",
        PipelineStatus::Partial => "partial",
        PipelineStatus::Failure => "failure",
        PipelineStatus::Blocked => "blocked",
    }
}

/// Render `outcome` as a plain-text report, one fact per line.
pub fn render_summary(outcome: &PipelineOutcome) -> String {
    let mut out = String::new();
    let goals = &outcome.meta_goal.goals;

    let _ = writeln!(out, "status: {}", status_label(outcome.status));
    let _ = writeln!(
        out,
        "gate: {} ({:.2}, {:?})",
        outcome.gate.classification, outcome.gate.confidence, outcome.gate.method
    );

    if !outcome.succeeded.is_empty() {
        let ids: Vec<&str> = outcome
            .succeeded
            .iter()
            .filter_map(|&index| goals.get(index))
            .map(|goal| goal.goal_id.as_str())
            .collect();
        let _ = writeln!(out, "succeeded: {}", ids.join(", "));
    }
    for failure in &outcome.failed {
        let label = match failure.kind {
            FailureKind::Failed => "failed",
            FailureKind::Skipped => "skipped",
        };
        let _ = writeln!(out, "{label}: {} ({})", failure.goal_id, failure.reason);
    }

    for reason in &outcome.eligibility.reasons {
        let _ = writeln!(out, "blocked: {reason}");
    }
    for warning in &outcome.eligibility.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }

    if !outcome.plan.steps.is_empty() {
        let _ = writeln!(out, "steps:");
    }
    for (position, step) in outcome.plan.steps.iter().enumerate() {
        let args: Vec<String> = step
            .args
            .iter()
            .chain(&step.params)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let _ = writeln!(
            out,
            "  {}. {} [{}] {}",
            position + 1,
            step.tool,
            step.node_id,
            args.join(" ")
        );
    }
    out
}
