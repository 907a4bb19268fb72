//! Tool registry loaded from configuration.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::planner::CapabilitySet;
use crate::core::tool_policy::tool_prefix;
use crate::core::types::{ActionClass, Domain};
use crate::io::config::PilotConfig;

/// One registered tool as the resolver sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    /// `<prefix>.<name>`, e.g. `files.create_folder`.
    pub name: String,
    pub description: String,
    pub action_class: ActionClass,
    /// Params owned by the planner. The resolver must never supply these.
    #[serde(default)]
    pub required_semantic_inputs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new(tools: impl IntoIterator<Item = ToolSpec>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|tool| (tool.name.clone(), tool))
                .collect(),
        }
    }

    pub fn from_config(cfg: &PilotConfig) -> Self {
        Self::new(cfg.tools.iter().cloned())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Domains with at least one tool whose prefix names that domain.
    pub fn capability_set(&self) -> CapabilitySet {
        CapabilitySet::from_domains(
            self.tools
                .keys()
                .filter_map(|name| Domain::from_str(tool_prefix(name)).ok()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: String::new(),
            action_class: ActionClass::Actuate,
            required_semantic_inputs: Vec::new(),
        }
    }

    #[test]
    fn capability_set_follows_registered_prefixes() {
        let registry = ToolRegistry::new([spec("files.create_folder"), spec("shell.run")]);
        let capabilities = registry.capability_set();
        assert!(capabilities.contains(Domain::Files));
        assert!(!capabilities.contains(Domain::Browser));
    }

    #[test]
    fn default_config_covers_every_domain() {
        let registry = ToolRegistry::from_config(&PilotConfig::default());
        let capabilities = registry.capability_set();
        for domain in Domain::ALL {
            assert!(capabilities.contains(domain), "{domain}");
        }
        assert!(registry.get("files.create_folder").is_some());
    }
}
