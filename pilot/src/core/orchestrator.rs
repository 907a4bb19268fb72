//! DAG-based multi-goal orchestration.
//!
//! Goals are planned in dependency order. Each goal sees the context frames of
//! every transitive ancestor and nothing else. A goal that fails to plan takes
//! its transitive dependents down with it; unrelated branches still plan.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use crate::core::dag::{ancestors, descendants, topological_order};
use crate::core::goal::{ContextFrame, MetaGoal};
use crate::core::plan::{
    FailureKind, GoalFailure, OrchestrationResult, Plan, PlanGraph, PlanStatus, node_id,
};
use crate::core::planner::{CapabilitySet, GoalPlanner, WorldState};

pub struct GoalOrchestrator<'a> {
    planner: GoalPlanner<'a>,
    capabilities: CapabilitySet,
}

impl<'a> GoalOrchestrator<'a> {
    pub fn new(planner: GoalPlanner<'a>, capabilities: CapabilitySet) -> Self {
        Self {
            planner,
            capabilities,
        }
    }

    #[instrument(skip_all, fields(goals = meta.goals.len(), meta_type = ?meta.meta_type))]
    pub fn orchestrate(&self, meta: &MetaGoal, world: &WorldState) -> OrchestrationResult {
        let count = meta.goals.len();
        let order = topological_order(count, &meta.dependencies).unwrap_or_else(|| {
            warn!("goal dependencies contain a cycle; using declaration order");
            (0..count).collect()
        });
        let position: BTreeMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &goal)| (goal, pos)).collect();

        let mut plans: BTreeMap<usize, Plan> = BTreeMap::new();
        let mut frames: BTreeMap<usize, Vec<ContextFrame>> = BTreeMap::new();
        let mut failures: BTreeMap<usize, GoalFailure> = BTreeMap::new();

        for &index in &order {
            if failures.contains_key(&index) {
                continue;
            }
            let goal = &meta.goals[index];

            let mut upstream: Vec<usize> = ancestors(&meta.dependencies, index)
                .into_iter()
                .filter(|ancestor| plans.contains_key(ancestor))
                .collect();
            upstream.sort_by_key(|ancestor| position.get(ancestor).copied());
            let inherited: Vec<ContextFrame> = upstream
                .iter()
                .flat_map(|ancestor| frames.get(ancestor).into_iter().flatten().cloned())
                .collect();

            let result = self
                .planner
                .plan(goal, world, &self.capabilities, &inherited);
            match (result.status, result.plan) {
                (PlanStatus::Success, Some(plan)) => {
                    frames.insert(index, plan.produced_frames().cloned().collect());
                    plans.insert(index, plan);
                }
                (status, _) => {
                    let reason = result
                        .reason
                        .unwrap_or_else(|| format!("planning returned {status:?}"));
                    warn!(goal = %goal.goal_id, ?status, %reason, "goal failed to plan");
                    failures.insert(
                        index,
                        GoalFailure {
                            goal_index: index,
                            goal_id: goal.goal_id.clone(),
                            kind: FailureKind::Failed,
                            reason,
                        },
                    );
                    for dependent in descendants(&meta.dependencies, index) {
                        if plans.contains_key(&dependent) || failures.contains_key(&dependent) {
                            continue;
                        }
                        failures.insert(
                            dependent,
                            GoalFailure {
                                goal_index: dependent,
                                goal_id: meta.goals[dependent].goal_id.clone(),
                                kind: FailureKind::Skipped,
                                reason: format!("depends on failed goal '{}'", goal.goal_id),
                            },
                        );
                    }
                }
            }
        }

        let succeeded: Vec<usize> = order
            .iter()
            .copied()
            .filter(|index| plans.contains_key(index))
            .collect();
        let failed: Vec<GoalFailure> = order
            .iter()
            .filter_map(|index| failures.remove(index))
            .collect();
        let status = OrchestrationResult::status_for(succeeded.len(), failed.len());
        let graph = (!succeeded.is_empty()).then(|| merge_plans(meta, &order, &position, &plans));

        info!(
            ?status,
            succeeded = succeeded.len(),
            failed = failed.len(),
            actions = graph.as_ref().map_or(0, |g| g.total_actions),
            "orchestration finished"
        );

        OrchestrationResult {
            status,
            graph,
            succeeded,
            failed,
        }
    }
}

/// Merge per-goal plans into one graph, namespacing node ids by goal index.
fn merge_plans(
    meta: &MetaGoal,
    order: &[usize],
    position: &BTreeMap<usize, usize>,
    plans: &BTreeMap<usize, Plan>,
) -> PlanGraph {
    let mut graph = PlanGraph::default();

    for &index in order {
        let Some(plan) = plans.get(&index) else {
            continue;
        };
        let ids: Vec<String> = plan
            .actions
            .iter()
            .map(|action| node_id(index, &action.action_id))
            .collect();

        for (id, action) in ids.iter().zip(&plan.actions) {
            graph.nodes.insert(id.clone(), action.clone());
        }
        for pair in ids.windows(2) {
            graph
                .edges
                .entry(pair[0].clone())
                .or_default()
                .push(pair[1].clone());
        }

        if let Some(first) = ids.first() {
            for parent in meta.parents(index) {
                let Some(parent_plan) = plans.get(&parent) else {
                    continue;
                };
                // Under the cycle fallback a parent may be ordered after its child.
                if position.get(&parent) >= position.get(&index) {
                    continue;
                }
                graph
                    .edges
                    .entry(node_id(parent, &parent_plan.goal_achieved_by))
                    .or_default()
                    .push(first.clone());
            }
        }

        graph.execution_order.extend(ids.iter().cloned());
        graph.goal_nodes.insert(index, ids);
    }

    graph.total_actions = graph.nodes.len();
    graph
}
