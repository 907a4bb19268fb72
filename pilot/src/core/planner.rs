//! Deterministic per-goal planning from the static rule table.
//!
//! The planner never calls a model. Identical `(goal, context_frames)` input
//! always produces an identical plan.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::authority::SemanticDefaults;
use crate::core::goal::{Anchor, ContextFrame, Goal};
use crate::core::invariants::validate_plan;
use crate::core::plan::{Plan, PlanResult, PlannedAction};
use crate::core::rules::{Capability, Rule, USE_DEFAULT_TOKEN};
use crate::core::types::Domain;

/// Read-only facts about the environment the plan will run in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    /// Concrete location for anchor tokens (e.g. `DRIVE_D` -> `D:/`).
    #[serde(default)]
    pub anchor_paths: BTreeMap<String, String>,
}

impl WorldState {
    /// Concrete path for `anchor`, or its token when the location is unknown.
    pub fn resolve_anchor(&self, anchor: &Anchor) -> String {
        let token = anchor.to_string();
        self.anchor_paths.get(&token).cloned().unwrap_or(token)
    }
}

/// Domains that have at least one registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    domains: BTreeSet<Domain>,
}

impl CapabilitySet {
    pub fn all() -> Self {
        Self {
            domains: Domain::ALL.into_iter().collect(),
        }
    }

    pub fn from_domains(domains: impl IntoIterator<Item = Domain>) -> Self {
        Self {
            domains: domains.into_iter().collect(),
        }
    }

    pub fn contains(&self, domain: Domain) -> bool {
        self.domains.contains(&domain)
    }
}

/// Where a resolved param value came from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamSource {
    Explicit,
    Authority,
    Anchor,
    Context,
    StaticDefault,
}

pub struct GoalPlanner<'a> {
    defaults: &'a dyn SemanticDefaults,
}

impl<'a> GoalPlanner<'a> {
    pub fn new(defaults: &'a dyn SemanticDefaults) -> Self {
        Self { defaults }
    }

    /// Plan one goal. Failures are reported through `PlanResult::status`.
    #[instrument(skip_all, fields(goal = %goal.goal_id, pair = %goal.label(), frames = context_frames.len()))]
    pub fn plan(
        &self,
        goal: &Goal,
        world: &WorldState,
        capabilities: &CapabilitySet,
        context_frames: &[ContextFrame],
    ) -> PlanResult {
        let Some(capability) = Capability::from_pair(goal.domain, goal.verb) else {
            return PlanResult::no_capability(format!("no planning rule for {}", goal.label()));
        };
        if !capabilities.contains(goal.domain) {
            return PlanResult::no_capability(format!(
                "no registered tools for domain '{}'",
                goal.domain
            ));
        }
        let rule = capability.rule();

        let params = match self.resolve_params(goal, rule, world, context_frames) {
            Ok(params) => params,
            Err(reason) => return PlanResult::blocked(reason),
        };

        let plan = match build_plan(goal, rule, &params) {
            Ok(plan) => plan,
            Err(reason) => return PlanResult::blocked(reason),
        };
        let errors = validate_plan(&plan);
        if !errors.is_empty() {
            return PlanResult::blocked(errors.join("; "));
        }
        debug!(actions = plan.total_actions, "planned goal");
        PlanResult::success(plan)
    }

    fn resolve_params(
        &self,
        goal: &Goal,
        rule: &Rule,
        world: &WorldState,
        frames: &[ContextFrame],
    ) -> Result<BTreeMap<String, String>, String> {
        let mut params = BTreeMap::new();
        for param in rule.known_params() {
            if let Some((value, source)) = self.resolve_param(goal, rule, param, world, frames) {
                debug!(param, ?source, "resolved param");
                params.insert(param.to_string(), value);
            }
        }

        for required in rule.required {
            if !params.contains_key(*required) {
                return Err(format!(
                    "missing required param '{required}' for {}",
                    goal.label()
                ));
            }
        }

        for (param, allowed) in rule.allowed {
            let Some(value) = params.get_mut(*param) else {
                continue;
            };
            match allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(value.trim()))
            {
                Some(canonical) => *value = (*canonical).to_string(),
                None => {
                    return Err(format!(
                        "param '{param}' value '{value}' is not one of [{}]",
                        allowed.join(", ")
                    ));
                }
            }
        }

        Ok(params)
    }

    /// Precedence: explicit > `@default` via authority > own anchor > upstream
    /// context > static default.
    fn resolve_param(
        &self,
        goal: &Goal,
        rule: &Rule,
        param: &str,
        world: &WorldState,
        frames: &[ContextFrame],
    ) -> Option<(String, ParamSource)> {
        let explicit = goal.params.get(param).map(String::as_str).or_else(|| {
            (rule.object_param == Some(param))
                .then_some(goal.object.as_deref())
                .flatten()
        });

        match explicit.map(str::trim) {
            Some(USE_DEFAULT_TOKEN) => {
                if let Some(value) = self.defaults.get_default(goal.domain, goal.verb, param) {
                    return Some((value, ParamSource::Authority));
                }
                debug!(param, "no semantic default; falling through");
            }
            Some(value) if !value.is_empty() => {
                return Some((value.to_string(), ParamSource::Explicit));
            }
            _ => {}
        }

        if rule.anchor_param == Some(param) {
            if let Some(anchor) = &goal.base_anchor {
                return Some((world.resolve_anchor(anchor), ParamSource::Anchor));
            }
        }

        if let Some(value) = from_context(rule, param, frames) {
            return Some((value, ParamSource::Context));
        }

        rule.default_for(param)
            .map(|value| (value.to_string(), ParamSource::StaticDefault))
    }
}

/// Most recently produced frame wins; sources are tried in rule order.
fn from_context(rule: &Rule, param: &str, frames: &[ContextFrame]) -> Option<String> {
    rule.consumes
        .iter()
        .filter(|source| source.param == param)
        .find_map(|source| {
            frames
                .iter()
                .rev()
                .filter(|frame| frame.domain == source.domain)
                .find_map(|frame| frame.get(source.key))
                .map(str::to_string)
        })
}

fn build_plan(goal: &Goal, rule: &Rule, params: &BTreeMap<String, String>) -> Result<Plan, String> {
    let mut actions = Vec::with_capacity(rule.steps.len());
    for (index, step) in rule.steps.iter().enumerate() {
        let mut args = BTreeMap::new();
        for name in step.args {
            if let Some(value) = params.get(*name) {
                args.insert((*name).to_string(), value.clone());
            }
        }
        actions.push(PlannedAction {
            action_id: format!("a{}", index + 1),
            intent: step.intent,
            action_class: step.action_class,
            description: render_template(step.description, params)?,
            args,
            produces: None,
        });
    }

    if let (Some(production), Some(last)) = (rule.produces, actions.last_mut()) {
        let mut data = BTreeMap::new();
        for (key, template) in production.data {
            data.insert((*key).to_string(), render_template(template, params)?);
        }
        last.produces = Some(ContextFrame {
            domain: production.domain,
            data,
            produced_by: Some(goal.goal_id.clone()),
        });
    }

    let goal_achieved_by = actions
        .last()
        .map(|action| action.action_id.clone())
        .ok_or_else(|| format!("rule for {} has no steps", goal.label()))?;
    let total_actions = actions.len();
    Ok(Plan {
        actions,
        goal_achieved_by,
        total_actions,
    })
}

/// Substitute `{param}` placeholders. Unknown placeholders are an error.
fn render_template(template: &str, params: &BTreeMap<String, String>) -> Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in '{template}'"))?;
        let name = &after[..end];
        let value = params
            .get(name)
            .ok_or_else(|| format!("unresolved placeholder '{{{name}}}' in '{template}'"))?;
        rendered.push_str(value);
        rest = &after[end + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}
