//! Plan-level data model: planned actions, per-goal plans and the merged plan graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::goal::ContextFrame;
use crate::core::types::{ActionClass, Intent};

/// One concrete, fully-resolved step before a tool identity is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_id: String,
    pub intent: Intent,
    pub action_class: ActionClass,
    pub description: String,
    pub args: BTreeMap<String, String>,
    /// Context handed to dependent goals once this action has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produces: Option<ContextFrame>,
}

/// Ordered actions that achieve one goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
    /// Action id whose completion means the goal is achieved.
    pub goal_achieved_by: String,
    pub total_actions: usize,
}

impl Plan {
    pub fn action(&self, action_id: &str) -> Option<&PlannedAction> {
        self.actions.iter().find(|action| action.action_id == action_id)
    }

    /// Frames this plan makes available to dependent goals, in action order.
    pub fn produced_frames(&self) -> impl Iterator<Item = &ContextFrame> {
        self.actions
            .iter()
            .filter_map(|action| action.produces.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Success,
    /// A required param was missing or invalid and nothing could fill it.
    Blocked,
    /// The goal's domain/verb pair has no rule or the domain is unavailable.
    NoCapability,
}

/// Planner outcome. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PlanResult {
    pub fn success(plan: Plan) -> Self {
        Self {
            status: PlanStatus::Success,
            plan: Some(plan),
            reason: None,
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            status: PlanStatus::Blocked,
            plan: None,
            reason: Some(reason.into()),
        }
    }

    pub fn no_capability(reason: impl Into<String>) -> Self {
        Self {
            status: PlanStatus::NoCapability,
            plan: None,
            reason: Some(reason.into()),
        }
    }
}

/// Graph node identifier, namespaced by owning goal (`g{index}.{action_id}`).
pub type NodeId = String;

pub fn node_id(goal_index: usize, action_id: &str) -> NodeId {
    format!("g{goal_index}.{action_id}")
}

/// Merged, ordered actions for an entire meta-goal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanGraph {
    pub nodes: BTreeMap<NodeId, PlannedAction>,
    /// Node id to the node ids that depend on it.
    pub edges: BTreeMap<NodeId, Vec<NodeId>>,
    /// Goal index to the node ids it owns, in plan order.
    pub goal_nodes: BTreeMap<usize, Vec<NodeId>>,
    pub execution_order: Vec<NodeId>,
    pub total_actions: usize,
}

impl PlanGraph {
    /// Goal index owning `node`.
    pub fn owner_of(&self, node: &str) -> Option<usize> {
        self.goal_nodes
            .iter()
            .find(|(_, nodes)| nodes.iter().any(|id| id == node))
            .map(|(index, _)| *index)
    }

    /// Direct predecessors of `node`.
    pub fn predecessors<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |(_, targets)| targets.iter().any(|target| target == node))
            .map(|(source, _)| source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The goal itself could not be planned or resolved.
    Failed,
    /// The goal was never attempted because a dependency failed.
    Skipped,
}

/// A goal that did not make it into the plan graph, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalFailure {
    pub goal_index: usize,
    pub goal_id: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub status: OrchestrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<PlanGraph>,
    /// Goal indices that planned successfully, in execution order.
    pub succeeded: Vec<usize>,
    pub failed: Vec<GoalFailure>,
}

impl OrchestrationResult {
    /// Derive the overall status from success/failure counts.
    pub fn status_for(succeeded: usize, failed: usize) -> OrchestrationStatus {
        match (succeeded, failed) {
            (_, 0) if succeeded > 0 => OrchestrationStatus::Success,
            (0, _) => OrchestrationStatus::Failure,
            _ => OrchestrationStatus::Partial,
        }
    }
}
