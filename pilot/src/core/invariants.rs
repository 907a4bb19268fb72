//! Structural invariants for meta-goals, plans and plan graphs.
//!
//! Each check returns a list of stable error messages; an empty list means the
//! value is well formed.

use std::collections::{BTreeSet, HashSet};

use crate::core::dag::{is_topological, topological_order};
use crate::core::goal::{MetaGoal, MetaType};
use crate::core::plan::{Plan, PlanGraph};
use crate::core::rules::USE_DEFAULT_TOKEN;

/// Check meta-goal shape:
/// - `single` has exactly one goal, multi types have at least two
/// - goal ids are unique
/// - edges only reference existing, earlier-declared goals
/// - edges are acyclic
pub fn validate_meta_goal(meta: &MetaGoal) -> Vec<String> {
    let mut errors = Vec::new();
    let count = meta.goals.len();

    match meta.meta_type {
        MetaType::Single if count != 1 => {
            errors.push(format!("single meta-goal has {count} goals"));
        }
        MetaType::IndependentMulti | MetaType::DependentMulti if count < 2 => {
            errors.push(format!("multi meta-goal has {count} goals"));
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    for goal in &meta.goals {
        if !seen.insert(goal.goal_id.as_str()) {
            errors.push(format!("duplicate goal id '{}'", goal.goal_id));
        }
    }

    for (&child, parents) in &meta.dependencies {
        if child >= count {
            errors.push(format!("dependency on unknown goal index {child}"));
            continue;
        }
        for &parent in parents {
            if parent >= count {
                errors.push(format!("goal {child}: unknown parent index {parent}"));
            } else if parent >= child {
                errors.push(format!(
                    "goal {child}: parent {parent} is not declared earlier"
                ));
            }
        }
    }

    if topological_order(count, &meta.dependencies).is_none() {
        errors.push("dependency edges contain a cycle".to_string());
    }

    errors
}

/// Check a single plan: unique action ids, a valid achieving action, the
/// declared total, and no arg still holding the `@default` request token.
///
/// Arg values are otherwise opaque; user text may contain braces.
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for action in &plan.actions {
        if !seen.insert(action.action_id.as_str()) {
            errors.push(format!("duplicate action id '{}'", action.action_id));
        }
        for (key, value) in &action.args {
            if value.trim() == USE_DEFAULT_TOKEN {
                errors.push(format!(
                    "{}: arg '{key}' has unresolved token '{USE_DEFAULT_TOKEN}'",
                    action.action_id
                ));
            }
        }
    }
    if plan.action(&plan.goal_achieved_by).is_none() {
        errors.push(format!(
            "goal_achieved_by '{}' is not an action in the plan",
            plan.goal_achieved_by
        ));
    }
    if plan.total_actions != plan.actions.len() {
        errors.push(format!(
            "total_actions {} does not match {} actions",
            plan.total_actions,
            plan.actions.len()
        ));
    }
    errors
}

/// Check a merged plan graph: every node scheduled exactly once, edges between
/// known nodes, goal ownership covering all nodes, and a topological order.
pub fn validate_plan_graph(graph: &PlanGraph) -> Vec<String> {
    let mut errors = Vec::new();

    let scheduled: BTreeSet<&str> = graph.execution_order.iter().map(String::as_str).collect();
    if scheduled.len() != graph.execution_order.len() {
        errors.push("execution_order schedules a node twice".to_string());
    }
    for id in graph.nodes.keys() {
        if !scheduled.contains(id.as_str()) {
            errors.push(format!("node '{id}' missing from execution_order"));
        }
    }
    for id in &graph.execution_order {
        if !graph.nodes.contains_key(id) {
            errors.push(format!("execution_order references unknown node '{id}'"));
        }
    }

    for (source, targets) in &graph.edges {
        for target in std::iter::once(source).chain(targets) {
            if !graph.nodes.contains_key(target) {
                errors.push(format!("edge references unknown node '{target}'"));
            }
        }
    }

    let owned: usize = graph.goal_nodes.values().map(Vec::len).sum();
    if owned != graph.nodes.len() {
        errors.push(format!(
            "goal ownership covers {owned} of {} nodes",
            graph.nodes.len()
        ));
    }
    if graph.total_actions != graph.nodes.len() {
        errors.push(format!(
            "total_actions {} does not match {} nodes",
            graph.total_actions,
            graph.nodes.len()
        ));
    }

    if !is_topological(&graph.execution_order, &graph.edges) {
        errors.push("execution_order is not a topological sort of edges".to_string());
    }

    errors
}
