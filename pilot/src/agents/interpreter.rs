//! Goal interpreter: request text to an immutable [`MetaGoal`].
//!
//! The backend only extracts goals. Dependencies, anchors and the meta type
//! are derived here, deterministically, from what it returned.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::agents::ParamSpec;
use crate::agents::gate::GateOutput;
use crate::core::classifier::Topology;
use crate::core::goal::{Goal, MetaGoal, Scope};
use crate::core::scope::{derive_anchor, derive_dependencies};
use crate::core::types::{Domain, Verb};
use crate::io::backend::{
    BackendError, GenerateRequest, ModelBackend, OutputSchema, generate_structured,
};
use crate::io::prompt::{PromptEngine, TopologyHint};

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("no goals could be extracted from the request")]
    NoGoals,
    #[error(
        "gate classified the request as {expected} (confidence {confidence:.2}) but {actual} goal(s) were extracted"
    )]
    TopologyMismatch {
        expected: Topology,
        actual: usize,
        confidence: f64,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("render interpreter prompt: {0}")]
    Prompt(#[from] minijinja::Error),
}

#[derive(Debug, Deserialize)]
struct InterpreterAnswer {
    goals: Vec<GoalSpec>,
}

#[derive(Debug, Deserialize)]
struct GoalSpec {
    goal_id: String,
    domain: Domain,
    verb: Verb,
    object: Option<String>,
    params: Vec<ParamSpec>,
    scope: Scope,
}

pub struct GoalInterpreter<'a> {
    backend: &'a dyn ModelBackend,
    prompts: &'a PromptEngine,
}

impl<'a> GoalInterpreter<'a> {
    pub fn new(backend: &'a dyn ModelBackend, prompts: &'a PromptEngine) -> Self {
        Self { backend, prompts }
    }

    #[instrument(skip_all, fields(text_len = text.len(), gate = ?gate.map(|g| g.classification)))]
    pub fn interpret(
        &self,
        text: &str,
        gate: Option<&GateOutput>,
    ) -> Result<MetaGoal, InterpretError> {
        let hint = gate.map(|gate| TopologyHint {
            classification: gate.classification.as_str(),
            confidence: gate.confidence,
            binding: gate.is_authoritative(),
        });
        let prompt = self.prompts.render_interpreter(text, hint.as_ref())?;
        let request = GenerateRequest::new(OutputSchema::Interpreter, prompt);
        let answer: InterpreterAnswer = generate_structured(self.backend, &request)?;

        if answer.goals.is_empty() {
            warn!("interpreter returned no goals");
            return Err(InterpretError::NoGoals);
        }
        if let Some(gate) = gate {
            check_topology(gate, answer.goals.len())?;
        }

        let goals = build_goals(answer.goals);
        let dependencies = derive_dependencies(&goals);
        let meta = MetaGoal::from_parts(goals, dependencies);
        info!(
            goals = meta.goals.len(),
            edges = meta.dependencies.values().map(BTreeSet::len).sum::<usize>(),
            meta_type = ?meta.meta_type,
            "interpreted request"
        );
        Ok(meta)
    }
}

/// Enforce an authoritative gate's topology on the extracted goal count.
fn check_topology(gate: &GateOutput, actual: usize) -> Result<(), InterpretError> {
    if !gate.is_authoritative() {
        return Ok(());
    }
    let consistent = match gate.classification {
        Topology::Single => actual == 1,
        Topology::Multi => actual >= 2,
    };
    if consistent {
        return Ok(());
    }
    warn!(
        expected = %gate.classification,
        actual,
        confidence = gate.confidence,
        "interpreter contradicted authoritative gate"
    );
    Err(InterpretError::TopologyMismatch {
        expected: gate.classification,
        actual,
        confidence: gate.confidence,
    })
}

fn build_goals(specs: Vec<GoalSpec>) -> Vec<Goal> {
    let mut taken: BTreeSet<String> = BTreeSet::new();
    specs
        .into_iter()
        .map(|spec| {
            let goal_id = unique_id(&mut taken, spec.goal_id.trim());
            let params: BTreeMap<String, String> = spec
                .params
                .into_iter()
                .map(|param| (param.name.trim().to_string(), param.value.into_string()))
                .collect();
            let object = spec
                .object
                .map(|object| object.trim().to_string())
                .filter(|object| !object.is_empty());
            let anchor = derive_anchor(&spec.scope);
            debug!(goal = %goal_id, domain = %spec.domain, verb = %spec.verb, scope = %spec.scope, "goal extracted");
            Goal {
                goal_id,
                domain: spec.domain,
                verb: spec.verb,
                object,
                params,
                scope: spec.scope,
                base_anchor: anchor,
            }
        })
        .collect()
}

/// `id`, or `id_2`, `id_3`, … when already taken.
fn unique_id(taken: &mut BTreeSet<String>, id: &str) -> String {
    let mut candidate = id.to_string();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{id}_{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
