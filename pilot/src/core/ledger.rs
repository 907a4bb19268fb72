//! Execution bookkeeping over a merged plan graph.
//!
//! The ledger never runs anything. An executor asks it which nodes are ready,
//! runs them, and records the outcome. A failed node takes every node reachable
//! from it down as `skipped`: the rest of its own goal and all dependent goals.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::plan::{NodeId, OrchestrationResult, OrchestrationStatus, PlanGraph};

/// What the executor reports for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Completed,
    Failed { reason: String },
    Skipped { reason: String },
}

impl NodeState {
    fn is_settled(&self) -> bool {
        !matches!(self, NodeState::Pending)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("node '{0}' is not part of the plan graph")]
    UnknownNode(String),
    #[error("node '{0}' already has an outcome")]
    AlreadyRecorded(String),
    #[error("node '{node}' is not ready; waiting on '{waiting_on}'")]
    NotReady { node: String, waiting_on: String },
}

/// Per-goal result derived from its nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GoalOutcome {
    Pending,
    Completed,
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub goals: BTreeMap<usize, GoalOutcome>,
    pub finished: bool,
}

impl LedgerSummary {
    /// Overall status once every goal has settled; `None` while work remains.
    pub fn status(&self) -> Option<OrchestrationStatus> {
        if !self.finished {
            return None;
        }
        let completed = self
            .goals
            .values()
            .filter(|outcome| matches!(outcome, GoalOutcome::Completed))
            .count();
        Some(OrchestrationResult::status_for(
            completed,
            self.goals.len() - completed,
        ))
    }
}

pub struct ExecutionLedger<'g> {
    graph: &'g PlanGraph,
    states: BTreeMap<NodeId, NodeState>,
}

impl<'g> ExecutionLedger<'g> {
    pub fn new(graph: &'g PlanGraph) -> Self {
        let states = graph
            .execution_order
            .iter()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();
        Self { graph, states }
    }

    pub fn state(&self, node: &str) -> Option<&NodeState> {
        self.states.get(node)
    }

    /// Pending nodes whose predecessors have all completed, in execution order.
    pub fn next_ready(&self) -> Vec<&'g str> {
        let graph: &'g PlanGraph = self.graph;
        graph
            .execution_order
            .iter()
            .filter(|id| matches!(self.states.get(id.as_str()), Some(NodeState::Pending)))
            .filter(|id| self.blocking_predecessor(id).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn record(&mut self, node: &str, outcome: NodeOutcome) -> Result<(), LedgerError> {
        match self.states.get(node) {
            None => return Err(LedgerError::UnknownNode(node.to_string())),
            Some(state) if state.is_settled() => {
                return Err(LedgerError::AlreadyRecorded(node.to_string()));
            }
            Some(_) => {}
        }
        if let Some(waiting_on) = self.blocking_predecessor(node) {
            return Err(LedgerError::NotReady {
                node: node.to_string(),
                waiting_on: waiting_on.clone(),
            });
        }

        match outcome {
            NodeOutcome::Completed => {
                debug!(node, "node completed");
                self.states.insert(node.to_string(), NodeState::Completed);
            }
            NodeOutcome::Failed(reason) => {
                warn!(node, %reason, "node failed");
                self.states
                    .insert(node.to_string(), NodeState::Failed { reason });
                self.skip_downstream(node);
            }
        }
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.states.values().all(NodeState::is_settled)
    }

    pub fn summary(&self) -> LedgerSummary {
        let goals = self
            .graph
            .goal_nodes
            .iter()
            .map(|(&index, nodes)| (index, self.goal_outcome(nodes)))
            .collect();
        LedgerSummary {
            goals,
            finished: self.is_finished(),
        }
    }

    fn goal_outcome(&self, nodes: &[NodeId]) -> GoalOutcome {
        let states: Vec<&NodeState> = nodes.iter().filter_map(|id| self.states.get(id)).collect();
        if let Some(reason) = states.iter().find_map(|state| match state {
            NodeState::Failed { reason } => Some(reason),
            _ => None,
        }) {
            return GoalOutcome::Failed {
                reason: reason.clone(),
            };
        }
        if let Some(reason) = states.iter().find_map(|state| match state {
            NodeState::Skipped { reason } => Some(reason),
            _ => None,
        }) {
            return GoalOutcome::Skipped {
                reason: reason.clone(),
            };
        }
        if states.iter().all(|state| matches!(state, NodeState::Completed)) {
            GoalOutcome::Completed
        } else {
            GoalOutcome::Pending
        }
    }

    fn blocking_predecessor<'s>(&'s self, node: &'s str) -> Option<&'s NodeId> {
        self.graph
            .predecessors(node)
            .find(|pred| !matches!(self.states.get(pred.as_str()), Some(NodeState::Completed)))
    }

    fn skip_downstream(&mut self, failed: &str) {
        let graph: &'g PlanGraph = self.graph;
        let mut seen: BTreeSet<&'g str> = BTreeSet::new();
        let mut stack: Vec<&str> = vec![failed];
        while let Some(current) = stack.pop() {
            for next in graph.edges.get(current).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    stack.push(next.as_str());
                }
            }
        }

        for node in seen {
            if let Some(state) = self.states.get_mut(node)
                && matches!(state, NodeState::Pending)
            {
                *state = NodeState::Skipped {
                    reason: format!("upstream node '{failed}' failed"),
                };
            }
        }
    }
}
