//! Two-stage, domain-locked tool resolution.
//!
//! Stage 1 offers the backend only tools under the intent's preferred
//! prefixes. Stage 2 runs when stage 1 had nothing to offer or scored below
//! threshold, and is locked to the intent's whitelist minus its blacklist.
//! The action class, when given, is a hard filter in both stages.
//!
//! The resolver picks a tool identity only. Semantic argument values belong
//! to the planner, and a backend answer that tries to supply one is rejected.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::agents::ParamSpec;
use crate::core::tool_policy::{IntentPolicy, has_prefix, policy_for};
use crate::core::types::{ActionClass, Intent};
use crate::io::backend::{
    BackendError, GenerateRequest, ModelBackend, OutputSchema, generate_structured,
};
use crate::io::prompt::{PromptEngine, ResolverStep};
use crate::io::registry::{ToolRegistry, ToolSpec};

/// Minimum backend confidence to accept a stage-1 pick.
pub const STAGE1_THRESHOLD: f64 = 0.7;

/// Penalty applied to stage-2 picks outside the preferred prefixes.
pub const DOMAIN_PENALTY: f64 = 0.15;

/// Minimum confidence, after penalty, to accept a stage-2 pick.
pub const STAGE2_THRESHOLD: f64 = 0.5;

const CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedStatus {
    CapabilityClassMismatch,
    Stage2Blocked,
    CapabilityMissing,
    UnknownTool,
    LowConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Resolved {
        tool: String,
        /// Tool-specific, non-semantic settings only.
        params: BTreeMap<String, String>,
        confidence: f64,
        domain_match: bool,
        stage: u8,
    },
    Unresolved {
        status: UnresolvedStatus,
        reason: String,
        stage: u8,
    },
}

impl Resolution {
    fn unresolved(status: UnresolvedStatus, stage: u8, reason: impl Into<String>) -> Self {
        Resolution::Unresolved {
            status,
            reason: reason.into(),
            stage,
        }
    }

    pub fn tool(&self) -> Option<&str> {
        match self {
            Resolution::Resolved { tool, .. } => Some(tool),
            Resolution::Unresolved { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolver supplied semantic input(s) {params:?} for tool '{tool}'")]
    SemanticInterference { tool: String, params: Vec<String> },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("render resolver prompt: {0}")]
    Prompt(#[from] minijinja::Error),
}

#[derive(Debug, Deserialize)]
struct ResolverAnswer {
    tool: String,
    confidence: f64,
    params: Vec<ParamSpec>,
}

/// Args are part of the key because they are rendered into the prompt.
type CacheKey = (Intent, String, BTreeMap<String, String>, Option<ActionClass>);

/// Outcome of asking the backend over one candidate set.
struct Pick {
    tool: String,
    confidence: f64,
    params: BTreeMap<String, String>,
}

pub struct ToolResolver {
    registry: ToolRegistry,
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<PromptEngine>,
    cache: Mutex<LruCache<CacheKey, Resolution>>,
}

impl ToolResolver {
    pub fn new(
        registry: ToolRegistry,
        backend: Arc<dyn ModelBackend>,
        prompts: Arc<PromptEngine>,
    ) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            backend,
            prompts,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Swap the registry. Cached resolutions refer to the old one and are dropped.
    pub fn replace_registry(&mut self, registry: ToolRegistry) {
        info!(tools = registry.len(), "replacing tool registry");
        self.registry = registry;
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[instrument(skip_all, fields(%intent, action_class = ?action_class))]
    pub fn resolve(
        &self,
        description: &str,
        intent: Intent,
        context: &BTreeMap<String, String>,
        action_class: Option<ActionClass>,
    ) -> Result<Resolution, ResolveError> {
        let key: CacheKey = (
            intent,
            description.to_string(),
            context.clone(),
            action_class,
        );
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            debug!("resolution cache hit");
            return Ok(hit.clone());
        }

        let resolution = self.resolve_uncached(description, intent, context, action_class)?;
        if matches!(resolution, Resolution::Resolved { .. }) {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(key, resolution.clone());
        }
        Ok(resolution)
    }

    fn resolve_uncached(
        &self,
        description: &str,
        intent: Intent,
        context: &BTreeMap<String, String>,
        action_class: Option<ActionClass>,
    ) -> Result<Resolution, ResolveError> {
        let policy = policy_for(intent);
        let in_class: Vec<&ToolSpec> = self
            .registry
            .iter()
            .filter(|tool| action_class.is_none_or(|class| tool.action_class == class))
            .collect();
        if let Some(class) = action_class
            && in_class.is_empty()
        {
            warn!(%class, "no registered tool has the required action class");
            return Ok(Resolution::unresolved(
                UnresolvedStatus::CapabilityClassMismatch,
                1,
                format!("no registered tool has action class '{class}'"),
            ));
        }

        let step = ResolverStep {
            description,
            intent,
            action_class,
            args: context,
        };

        let preferred: Vec<&ToolSpec> = in_class
            .iter()
            .copied()
            .filter(|tool| has_prefix(&tool.name, policy.preferred))
            .filter(|tool| !has_prefix(&tool.name, policy.blacklist))
            .collect();
        if preferred.is_empty() {
            debug!("stage 1 has no candidates");
        } else {
            let Some(pick) = self.pick(&step, &preferred)? else {
                return Ok(Resolution::unresolved(
                    UnresolvedStatus::UnknownTool,
                    1,
                    "backend chose a tool outside the stage-1 candidates",
                ));
            };
            if pick.confidence >= STAGE1_THRESHOLD {
                info!(tool = %pick.tool, confidence = pick.confidence, "resolved in stage 1");
                return Ok(Resolution::Resolved {
                    tool: pick.tool,
                    params: pick.params,
                    confidence: pick.confidence,
                    domain_match: true,
                    stage: 1,
                });
            }
            debug!(tool = %pick.tool, confidence = pick.confidence, "stage 1 below threshold");
        }

        self.stage_two(&step, &policy, &in_class)
    }

    fn stage_two(
        &self,
        step: &ResolverStep<'_>,
        policy: &IntentPolicy,
        in_class: &[&ToolSpec],
    ) -> Result<Resolution, ResolveError> {
        if policy.fallback_whitelist.is_empty() {
            warn!(intent = %step.intent, "stage 2 is not available for this intent");
            return Ok(Resolution::unresolved(
                UnresolvedStatus::Stage2Blocked,
                2,
                format!("no fallback domains are allowed for {}", step.intent),
            ));
        }

        let candidates: Vec<&ToolSpec> = in_class
            .iter()
            .copied()
            .filter(|tool| has_prefix(&tool.name, policy.fallback_whitelist))
            .filter(|tool| !has_prefix(&tool.name, policy.blacklist))
            .collect();
        if candidates.is_empty() {
            warn!(intent = %step.intent, "stage 2 has no candidates");
            return Ok(Resolution::unresolved(
                UnresolvedStatus::CapabilityMissing,
                2,
                format!(
                    "no registered tool under {:?} can perform {}",
                    policy.fallback_whitelist, step.intent
                ),
            ));
        }

        let Some(pick) = self.pick(step, &candidates)? else {
            return Ok(Resolution::unresolved(
                UnresolvedStatus::UnknownTool,
                2,
                "backend chose a tool outside the stage-2 candidates",
            ));
        };

        let domain_match = has_prefix(&pick.tool, policy.preferred);
        let confidence = if domain_match {
            pick.confidence
        } else {
            (pick.confidence - DOMAIN_PENALTY).max(0.0)
        };
        if confidence < STAGE2_THRESHOLD {
            warn!(tool = %pick.tool, confidence, "stage 2 pick below threshold");
            return Ok(Resolution::unresolved(
                UnresolvedStatus::LowConfidence,
                2,
                format!("best fallback '{}' scored {confidence:.2}", pick.tool),
            ));
        }

        info!(tool = %pick.tool, confidence, domain_match, "resolved in stage 2");
        Ok(Resolution::Resolved {
            tool: pick.tool,
            params: pick.params,
            confidence,
            domain_match,
            stage: 2,
        })
    }

    /// Ask the backend to choose among `candidates`. `None` if it named
    /// something else.
    fn pick(
        &self,
        step: &ResolverStep<'_>,
        candidates: &[&ToolSpec],
    ) -> Result<Option<Pick>, ResolveError> {
        let prompt = self.prompts.render_resolver(step, candidates)?;
        let request = GenerateRequest::new(OutputSchema::Resolver, prompt);
        let answer: ResolverAnswer = generate_structured(self.backend.as_ref(), &request)?;

        let Some(tool) = candidates.iter().find(|tool| tool.name == answer.tool) else {
            warn!(tool = %answer.tool, offered = candidates.len(), "backend chose an unoffered tool");
            return Ok(None);
        };

        let params: BTreeMap<String, String> = answer
            .params
            .into_iter()
            .map(|param| (param.name, param.value.into_string()))
            .collect();
        let interfering: Vec<String> = params
            .keys()
            .filter(|key| tool.required_semantic_inputs.contains(*key))
            .cloned()
            .collect();
        if !interfering.is_empty() {
            return Err(ResolveError::SemanticInterference {
                tool: tool.name.clone(),
                params: interfering,
            });
        }

        Ok(Some(Pick {
            tool: tool.name.clone(),
            confidence: answer.confidence,
            params,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::default_tools;
    use crate::test_support::{ScriptedBackend, resolver_answer};
    use serde_json::json;

    fn resolver(backend: &Arc<ScriptedBackend>, tools: Vec<ToolSpec>) -> ToolResolver {
        ToolResolver::new(
            ToolRegistry::new(tools),
            backend.clone(),
            Arc::new(PromptEngine::new().expect("prompts")),
        )
    }

    fn spec(name: &str, class: ActionClass, semantic: &[&str]) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("{name} tool"),
            action_class: class,
            required_semantic_inputs: semantic.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn resolve(
        resolver: &ToolResolver,
        intent: Intent,
        class: Option<ActionClass>,
    ) -> Result<Resolution, ResolveError> {
        resolver.resolve("do the thing", intent, &BTreeMap::new(), class)
    }

    #[test]
    fn stage_one_accepts_confident_pick() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("browser.open_url", 0.9)));
        let resolver = resolver(&backend, default_tools());
        let resolution =
            resolve(&resolver, Intent::BrowserNavigate, Some(ActionClass::Actuate)).unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved {
                tool: "browser.open_url".to_string(),
                params: BTreeMap::new(),
                confidence: 0.9,
                domain_match: true,
                stage: 1,
            }
        );
        let prompt = &backend.prompts(OutputSchema::Resolver)[0];
        assert!(prompt.contains("browser.open_url"));
        assert!(!prompt.contains("files.create_folder"));
    }

    #[test]
    fn semantic_inputs_in_params_are_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut answer = resolver_answer("browser.open_url", 0.95);
        answer["params"] = json!([{"name": "url", "value": "https://guess.example"}]);
        backend.push(OutputSchema::Resolver, Ok(answer));
        let resolver = resolver(&backend, default_tools());
        let err = resolve(&resolver, Intent::BrowserNavigate, None).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::SemanticInterference { ref params, .. } if params == &vec!["url".to_string()]
        ));
    }

    #[test]
    fn missing_action_class_fails_without_relaxation() {
        let backend = Arc::new(ScriptedBackend::new());
        let tools = vec![spec("clipboard.write_text", ActionClass::Actuate, &["content"])];
        let resolver = resolver(&backend, tools);
        let resolution = resolve(&resolver, Intent::ClipboardRead, Some(ActionClass::Query)).unwrap();
        assert!(matches!(
            resolution,
            Resolution::Unresolved {
                status: UnresolvedStatus::CapabilityClassMismatch,
                ..
            }
        ));
        assert_eq!(backend.calls(OutputSchema::Resolver), 0);
    }

    #[test]
    fn stage_two_is_locked_to_whitelist() {
        // FileCreate whitelists only `files`; nothing there has the class.
        let backend = Arc::new(ScriptedBackend::new());
        let tools = vec![
            spec("files.list_dir", ActionClass::Observe, &["location"]),
            spec("shell.run", ActionClass::Actuate, &["command"]),
            spec("apps.launch", ActionClass::Actuate, &["app"]),
        ];
        let resolver = resolver(&backend, tools);
        let resolution = resolve(&resolver, Intent::FileCreate, Some(ActionClass::Actuate)).unwrap();
        assert!(matches!(
            resolution,
            Resolution::Unresolved {
                status: UnresolvedStatus::CapabilityMissing,
                stage: 2,
                ..
            }
        ));
        assert_eq!(backend.calls(OutputSchema::Resolver), 0);
    }

    #[test]
    fn empty_whitelist_blocks_stage_two() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("system.set_volume", 0.4)));
        let resolver = resolver(&backend, default_tools());
        let resolution = resolve(&resolver, Intent::SystemSet, None).unwrap();
        assert!(matches!(
            resolution,
            Resolution::Unresolved {
                status: UnresolvedStatus::Stage2Blocked,
                ..
            }
        ));
    }

    #[test]
    fn stage_two_penalizes_off_domain_pick() {
        // AppLaunch prefers `apps`, may fall back to `shell`.
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("shell.run", 0.8)));
        let tools = vec![spec("shell.run", ActionClass::Actuate, &["command"])];
        let resolver = resolver(&backend, tools);
        let resolution = resolve(&resolver, Intent::AppLaunch, Some(ActionClass::Actuate)).unwrap();
        let Resolution::Resolved {
            tool,
            confidence,
            domain_match,
            stage,
            ..
        } = resolution
        else {
            panic!("expected resolution, got {resolution:?}");
        };
        assert_eq!(tool, "shell.run");
        assert!(!domain_match);
        assert_eq!(stage, 2);
        assert!((confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn weak_fallback_is_low_confidence() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("shell.run", 0.6)));
        let tools = vec![spec("shell.run", ActionClass::Actuate, &["command"])];
        let resolver = resolver(&backend, tools);
        let resolution = resolve(&resolver, Intent::AppLaunch, None).unwrap();
        assert!(matches!(
            resolution,
            Resolution::Unresolved {
                status: UnresolvedStatus::LowConfidence,
                ..
            }
        ));
    }

    #[test]
    fn unoffered_tool_is_unknown() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("input.type_text", 0.99)));
        let resolver = resolver(&backend, default_tools());
        let resolution = resolve(&resolver, Intent::BrowserSearch, None).unwrap();
        assert!(matches!(
            resolution,
            Resolution::Unresolved {
                status: UnresolvedStatus::UnknownTool,
                stage: 1,
                ..
            }
        ));
    }

    #[test]
    fn cache_serves_repeats_and_clears_on_registry_change() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.9)));
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.8)));
        let mut resolver = resolver(&backend, default_tools());

        let first = resolve(&resolver, Intent::AppLaunch, None).unwrap();
        let second = resolve(&resolver, Intent::AppLaunch, None).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.calls(OutputSchema::Resolver), 1);
        assert_eq!(resolver.cached_len(), 1);

        resolver.replace_registry(ToolRegistry::new(default_tools()));
        assert_eq!(resolver.cached_len(), 0);
        let third = resolve(&resolver, Intent::AppLaunch, None).unwrap();
        assert_eq!(backend.calls(OutputSchema::Resolver), 2);
        assert!(matches!(third, Resolution::Resolved { confidence, .. } if (confidence - 0.8).abs() < 1e-9));
    }

    #[test]
    fn cache_keys_on_args_as_well_as_description() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.9)));
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.7)));
        let resolver = resolver(&backend, default_tools());
        let slack = BTreeMap::from([("app".to_string(), "slack".to_string())]);
        let zoom = BTreeMap::from([("app".to_string(), "zoom".to_string())]);

        resolver
            .resolve("Launch app", Intent::AppLaunch, &slack, None)
            .unwrap();
        let other = resolver
            .resolve("Launch app", Intent::AppLaunch, &zoom, None)
            .unwrap();
        assert_eq!(backend.calls(OutputSchema::Resolver), 2);
        assert!(matches!(other, Resolution::Resolved { confidence, .. } if (confidence - 0.7).abs() < 1e-9));
        assert!(backend.prompts(OutputSchema::Resolver)[1].contains("zoom"));

        resolver
            .resolve("Launch app", Intent::AppLaunch, &slack, None)
            .unwrap();
        assert_eq!(backend.calls(OutputSchema::Resolver), 2);
        assert_eq!(resolver.cached_len(), 2);
    }
}
