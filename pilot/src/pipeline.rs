//! End-to-end request pipeline.
//!
//! text → gate → interpreter → orchestrator → resolver (per node) →
//! eligibility. The result is an [`ExecutablePlan`]: ordered steps, each with a
//! concrete tool and fully resolved args, that an executor runs verbatim.
//!
//! A node that cannot be resolved fails its goal. That goal's transitive
//! dependents are skipped, and every node of a failed or skipped goal is
//! removed from the executable plan. Unrelated goals are unaffected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::agents::gate::{DecompositionGate, GateOutput};
use crate::agents::interpreter::{GoalInterpreter, InterpretError};
use crate::agents::resolver::{ResolveError, Resolution, ToolResolver};
use crate::authority::{
    ConfiguredDefaults, ConfiguredEligibility, EligibilityAuthority, EligibilityVerdict,
    SemanticDefaults, check_eligibility,
};
use crate::core::dag::descendants;
use crate::core::goal::MetaGoal;
use crate::core::invariants::validate_plan_graph;
use crate::core::orchestrator::GoalOrchestrator;
use crate::core::plan::{
    FailureKind, GoalFailure, NodeId, OrchestrationResult, OrchestrationStatus, PlanGraph,
};
use crate::core::planner::{GoalPlanner, WorldState};
use crate::core::types::{ActionClass, Intent};
use crate::io::backend::ModelBackend;
use crate::io::config::PilotConfig;
use crate::io::prompt::PromptEngine;
use crate::io::registry::ToolRegistry;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Interpret(#[from] InterpretError),
    #[error("resolve node '{node}': {source}")]
    Resolve {
        node: NodeId,
        #[source]
        source: ResolveError,
    },
    #[error("plan graph violates invariants: {}", .0.join("; "))]
    InvalidGraph(Vec<String>),
}

/// One instruction for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableStep {
    pub node_id: NodeId,
    pub goal_index: usize,
    pub intent: Intent,
    pub action_class: ActionClass,
    pub description: String,
    pub tool: String,
    /// Semantic args from the planner.
    pub args: BTreeMap<String, String>,
    /// Tool-specific settings from the resolver.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutablePlan {
    pub steps: Vec<ExecutableStep>,
    /// Graph restricted to the goals that survived resolution.
    pub graph: PlanGraph,
}

impl ExecutablePlan {
    pub fn tools(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.tool.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Partial,
    Failure,
    /// Resolved, but the eligibility authority refused the tool sequence.
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub gate: GateOutput,
    pub meta_goal: MetaGoal,
    /// Goal indices with an executable plan, in execution order.
    pub succeeded: Vec<usize>,
    /// Planning and resolution failures together, by goal index.
    pub failed: Vec<GoalFailure>,
    pub plan: ExecutablePlan,
    pub eligibility: EligibilityVerdict,
}

pub struct Pipeline {
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<PromptEngine>,
    defaults: Box<dyn SemanticDefaults>,
    eligibility: Box<dyn EligibilityAuthority>,
    resolver: ToolResolver,
    world: WorldState,
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        defaults: Box<dyn SemanticDefaults>,
        eligibility: Box<dyn EligibilityAuthority>,
        registry: ToolRegistry,
        world: WorldState,
    ) -> Result<Self> {
        let prompts = Arc::new(PromptEngine::new().context("load prompt templates")?);
        let resolver = ToolResolver::new(registry, Arc::clone(&backend), Arc::clone(&prompts));
        Ok(Self {
            backend,
            prompts,
            defaults,
            eligibility,
            resolver,
            world,
        })
    }

    /// Wire the config-backed authorities, registry and anchors around `backend`.
    pub fn from_config(cfg: &PilotConfig, backend: Arc<dyn ModelBackend>) -> Result<Self> {
        Self::new(
            backend,
            Box::new(ConfiguredDefaults::new(cfg.defaults.clone())),
            Box::new(ConfiguredEligibility::new(&cfg.eligibility)),
            ToolRegistry::from_config(cfg),
            WorldState {
                anchor_paths: cfg.anchors.clone(),
            },
        )
    }

    pub fn replace_registry(&mut self, registry: ToolRegistry) {
        self.resolver.replace_registry(registry);
    }

    #[instrument(skip_all, fields(text_len = text.len()))]
    pub fn run(&self, text: &str) -> Result<PipelineOutcome, PipelineError> {
        let gate = DecompositionGate::new(self.backend.as_ref(), &self.prompts).classify(text);
        let meta = GoalInterpreter::new(self.backend.as_ref(), &self.prompts)
            .interpret(text, Some(&gate))?;

        let orchestrator = GoalOrchestrator::new(
            GoalPlanner::new(self.defaults.as_ref()),
            self.resolver.registry().capability_set(),
        );
        let orchestration = orchestrator.orchestrate(&meta, &self.world);

        let (plan, succeeded, failed) = self.resolve_graph(&meta, orchestration)?;

        let eligibility = if plan.steps.is_empty() {
            EligibilityVerdict::allowed()
        } else {
            check_eligibility(self.eligibility.as_ref(), &plan.tools())
        };

        let status = match OrchestrationResult::status_for(succeeded.len(), failed.len()) {
            OrchestrationStatus::Failure => PipelineStatus::Failure,
            _ if eligibility.blocked => PipelineStatus::Blocked,
            OrchestrationStatus::Partial => PipelineStatus::Partial,
            OrchestrationStatus::Success => PipelineStatus::Success,
        };
        info!(
            ?status,
            steps = plan.steps.len(),
            failed = failed.len(),
            "pipeline finished"
        );

        Ok(PipelineOutcome {
            status,
            gate,
            meta_goal: meta,
            succeeded,
            failed,
            plan,
            eligibility,
        })
    }

    /// Resolve every node of the orchestrated graph and drop goals that
    /// failed to resolve, together with their dependents.
    fn resolve_graph(
        &self,
        meta: &MetaGoal,
        orchestration: OrchestrationResult,
    ) -> Result<(ExecutablePlan, Vec<usize>, Vec<GoalFailure>), PipelineError> {
        let mut failures: BTreeMap<usize, GoalFailure> = orchestration
            .failed
            .into_iter()
            .map(|failure| (failure.goal_index, failure))
            .collect();
        let Some(graph) = orchestration.graph else {
            return Ok((ExecutablePlan::default(), Vec::new(), failures.into_values().collect()));
        };

        let mut steps = Vec::with_capacity(graph.execution_order.len());
        for node_id in &graph.execution_order {
            let Some(goal_index) = graph.owner_of(node_id) else {
                continue;
            };
            if failures.contains_key(&goal_index) {
                continue;
            }
            let Some(action) = graph.nodes.get(node_id) else {
                continue;
            };

            let resolution = self
                .resolver
                .resolve(
                    &action.description,
                    action.intent,
                    &action.args,
                    Some(action.action_class),
                )
                .map_err(|source| PipelineError::Resolve {
                    node: node_id.clone(),
                    source,
                })?;

            match resolution {
                Resolution::Resolved { tool, params, .. } => steps.push(ExecutableStep {
                    node_id: node_id.clone(),
                    goal_index,
                    intent: action.intent,
                    action_class: action.action_class,
                    description: action.description.clone(),
                    tool,
                    args: action.args.clone(),
                    params,
                }),
                Resolution::Unresolved { status, reason, .. } => {
                    let goal_id = meta.goals[goal_index].goal_id.clone();
                    warn!(node = %node_id, ?status, %reason, "node could not be resolved");
                    failures.insert(
                        goal_index,
                        GoalFailure {
                            goal_index,
                            goal_id: goal_id.clone(),
                            kind: FailureKind::Failed,
                            reason: format!("{node_id}: {reason}"),
                        },
                    );
                    for dependent in descendants(&meta.dependencies, goal_index) {
                        failures.entry(dependent).or_insert_with(|| GoalFailure {
                            goal_index: dependent,
                            goal_id: meta.goals[dependent].goal_id.clone(),
                            kind: FailureKind::Skipped,
                            reason: format!("depends on failed goal '{goal_id}'"),
                        });
                    }
                }
            }
        }

        let dropped: BTreeSet<usize> = failures.keys().copied().collect();
        steps.retain(|step| !dropped.contains(&step.goal_index));
        let graph = prune_graph(graph, &dropped);
        let errors = validate_plan_graph(&graph);
        if !errors.is_empty() {
            return Err(PipelineError::InvalidGraph(errors));
        }
        let succeeded: Vec<usize> = orchestration
            .succeeded
            .into_iter()
            .filter(|index| !dropped.contains(index))
            .collect();

        Ok((
            ExecutablePlan { steps, graph },
            succeeded,
            failures.into_values().collect(),
        ))
    }
}

/// Remove every node owned by a goal in `dropped`.
fn prune_graph(mut graph: PlanGraph, dropped: &BTreeSet<usize>) -> PlanGraph {
    let removed: BTreeSet<NodeId> = graph
        .goal_nodes
        .iter()
        .filter(|(index, _)| dropped.contains(index))
        .flat_map(|(_, nodes)| nodes.iter().cloned())
        .collect();
    if removed.is_empty() {
        return graph;
    }

    graph.goal_nodes.retain(|index, _| !dropped.contains(index));
    graph.nodes.retain(|id, _| !removed.contains(id));
    graph.execution_order.retain(|id| !removed.contains(id));
    graph.edges.retain(|source, _| !removed.contains(source));
    for targets in graph.edges.values_mut() {
        targets.retain(|target| !removed.contains(target));
    }
    graph.edges.retain(|_, targets| !targets.is_empty());
    graph.total_actions = graph.nodes.len();
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{AuthorityError, NoDefaults};
    use crate::io::backend::{BackendError, OutputSchema};
    use crate::io::config::{EligibilityConfig, default_tools};
    use crate::test_support::{
        ScriptedBackend, goal_json, interpreter_answer, resolver_answer,
    };
    use serde_json::json;

    struct Unreachable;

    impl EligibilityAuthority for Unreachable {
        fn evaluate(&self, _tools: &[String]) -> Result<EligibilityVerdict, AuthorityError> {
            Err(AuthorityError::Unavailable("timeout".to_string()))
        }
    }

    fn pipeline(backend: &Arc<ScriptedBackend>, eligibility: Box<dyn EligibilityAuthority>) -> Pipeline {
        Pipeline::new(
            backend.clone(),
            Box::new(NoDefaults),
            eligibility,
            ToolRegistry::new(default_tools()),
            WorldState::default(),
        )
        .expect("pipeline")
    }

    fn open_eligibility() -> Box<dyn EligibilityAuthority> {
        Box::new(ConfiguredEligibility::new(&EligibilityConfig::default()))
    }

    const FOLDERS: &str = "create a folder called Reports and put a folder called 2024 inside it";

    fn script_folders(backend: &ScriptedBackend) {
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![
                goal_json("g1", "files", "create", Some("Reports"), "root"),
                goal_json("g2", "files", "create", Some("2024"), "inside:g1"),
            ])),
        );
    }

    #[test]
    fn dependent_request_becomes_ordered_executable_plan() {
        let backend = Arc::new(ScriptedBackend::new());
        script_folders(&backend);
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("files.create_folder", 0.95)));
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("files.create_folder", 0.9)));

        let outcome = pipeline(&backend, open_eligibility()).run(FOLDERS).expect("run");

        assert_eq!(outcome.status, PipelineStatus::Success);
        assert_eq!(outcome.gate.classification.as_str(), "multi");
        let nodes: Vec<&str> = outcome.plan.steps.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(nodes, vec!["g0.a1", "g1.a1"]);
        assert_eq!(outcome.plan.steps[1].args["location"], "HOME/Reports");
        assert!(validate_plan_graph(&outcome.plan.graph).is_empty());
        // Descriptions differ, so neither node is served from the cache.
        assert_eq!(backend.calls(OutputSchema::Resolver), 2);
    }

    #[test]
    fn unresolvable_node_fails_goal_and_skips_dependents() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![
                goal_json("shot", "screen", "capture", None, "root"),
                goal_json("copy", "clipboard", "copy", None, "after:shot"),
                goal_json("app", "apps", "launch", Some("slack"), "root"),
            ])),
        );
        // screen.capture picks an unoffered tool; apps.launch resolves.
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("files.list_dir", 0.9)));
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.9)));

        let outcome = pipeline(&backend, open_eligibility())
            .run("take a screenshot, then copy it, then open slack")
            .expect("run");

        assert_eq!(outcome.status, PipelineStatus::Partial);
        assert_eq!(outcome.succeeded, vec![2]);
        let kinds: Vec<(usize, FailureKind)> =
            outcome.failed.iter().map(|f| (f.goal_index, f.kind)).collect();
        assert_eq!(kinds, vec![(0, FailureKind::Failed), (1, FailureKind::Skipped)]);
        assert_eq!(outcome.plan.tools(), vec!["apps.launch".to_string()]);
        assert_eq!(outcome.plan.graph.execution_order, vec!["g2.a1".to_string()]);
        assert!(outcome.plan.graph.edges.is_empty());
    }

    #[test]
    fn eligibility_failure_blocks_everything() {
        let backend = Arc::new(ScriptedBackend::new());
        script_folders(&backend);
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("files.create_folder", 0.95)));
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("files.create_folder", 0.95)));

        let outcome = pipeline(&backend, Box::new(Unreachable)).run(FOLDERS).expect("run");
        assert_eq!(outcome.status, PipelineStatus::Blocked);
        assert!(outcome.eligibility.blocked);
        assert!(outcome.eligibility.reasons[0].contains("timeout"));
    }

    #[test]
    fn topology_violation_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![goal_json(
                "g1", "files", "create", Some("Reports"), "root",
            )])),
        );
        let err = pipeline(&backend, open_eligibility()).run(FOLDERS).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Interpret(InterpretError::TopologyMismatch { .. })
        ));
    }

    #[test]
    fn semantic_interference_aborts_the_request() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![goal_json(
                "g1", "browser", "navigate", Some("https://example.com"), "root",
            )])),
        );
        let mut answer = resolver_answer("browser.open_url", 0.9);
        answer["params"] = json!([{"name": "url", "value": "https://elsewhere.example"}]);
        backend.push(OutputSchema::Resolver, Ok(answer));

        let err = pipeline(&backend, open_eligibility())
            .run("go to https://example.com")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Resolve {
                source: ResolveError::SemanticInterference { .. },
                ..
            }
        ));
    }

    #[test]
    fn unplannable_request_is_failure_without_backend_resolution() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![goal_json("g1", "screen", "delete", None, "root")])),
        );
        let outcome = pipeline(&backend, open_eligibility())
            .run("delete the screen")
            .expect("run");
        assert_eq!(outcome.status, PipelineStatus::Failure);
        assert!(outcome.plan.steps.is_empty());
        assert_eq!(backend.calls(OutputSchema::Resolver), 0);
    }

    #[test]
    fn interpreter_outage_propagates() {
        let backend = Arc::new(ScriptedBackend::new());
        let err = pipeline(&backend, open_eligibility())
            .run("take a screenshot")
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Interpret(InterpretError::Backend(BackendError::Unavailable(_)))
        ));
    }
}
