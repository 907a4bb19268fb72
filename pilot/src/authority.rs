//! External authorities consulted by the pipeline.
//!
//! - [`SemanticDefaults`] answers `@default` param tokens during planning.
//! - [`EligibilityAuthority`] decides whether an ordered tool list may run.
//!   It is always consulted through [`check_eligibility`], which fails closed.
//!
//! The configured implementations read their tables from [`PilotConfig`]
//! once at startup and are passed explicitly to the components that use them.
//!
//! [`PilotConfig`]: crate::io::config::PilotConfig

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::types::{Domain, Verb};
use crate::io::config::EligibilityConfig;

/// Source of semantic defaults for explicitly requested `@default` params.
pub trait SemanticDefaults: Send + Sync {
    fn get_default(&self, domain: Domain, verb: Verb, param: &str) -> Option<String>;
}

/// Authority that knows no defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaults;

impl SemanticDefaults for NoDefaults {
    fn get_default(&self, _domain: Domain, _verb: Verb, _param: &str) -> Option<String> {
        None
    }
}

/// Defaults keyed by `domain.verb` then param name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfiguredDefaults {
    table: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfiguredDefaults {
    pub fn new(table: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { table }
    }
}

impl SemanticDefaults for ConfiguredDefaults {
    fn get_default(&self, domain: Domain, verb: Verb, param: &str) -> Option<String> {
        let value = self
            .table
            .get(&format!("{domain}.{verb}"))
            .and_then(|params| params.get(param))
            .cloned();
        debug!(%domain, %verb, param, found = value.is_some(), "semantic default lookup");
        value
    }
}

/// Decision over an ordered list of tool names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub blocked: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Non-blocking notes surfaced to the user.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl EligibilityVerdict {
    pub fn allowed() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("eligibility authority unavailable: {0}")]
    Unavailable(String),
}

/// Safety authority over candidate tool sequences.
pub trait EligibilityAuthority: Send + Sync {
    fn evaluate(&self, tools: &[String]) -> Result<EligibilityVerdict, AuthorityError>;
}

/// Ask the authority about `tools`, treating any failure as "deny everything".
pub fn check_eligibility(authority: &dyn EligibilityAuthority, tools: &[String]) -> EligibilityVerdict {
    match authority.evaluate(tools) {
        Ok(verdict) => verdict,
        Err(err) => {
            warn!(err = %err, tools = tools.len(), "eligibility check failed closed");
            EligibilityVerdict {
                blocked: true,
                reasons: vec![err.to_string()],
                warnings: Vec::new(),
            }
        }
    }
}

/// Deny/warn lists from config. An entry matches a tool by exact name or by
/// domain prefix (`input` matches `input.type_text`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfiguredEligibility {
    deny: Vec<String>,
    warn: Vec<String>,
}

impl ConfiguredEligibility {
    pub fn new(config: &EligibilityConfig) -> Self {
        Self {
            deny: config.deny.clone(),
            warn: config.warn.clone(),
        }
    }
}

impl EligibilityAuthority for ConfiguredEligibility {
    fn evaluate(&self, tools: &[String]) -> Result<EligibilityVerdict, AuthorityError> {
        let mut verdict = EligibilityVerdict::allowed();
        for (position, tool) in tools.iter().enumerate() {
            if let Some(entry) = self.deny.iter().find(|entry| entry_matches(entry, tool)) {
                verdict.blocked = true;
                verdict
                    .reasons
                    .push(format!("step {}: tool '{tool}' denied by '{entry}'", position + 1));
            } else if let Some(entry) = self.warn.iter().find(|entry| entry_matches(entry, tool)) {
                verdict
                    .warnings
                    .push(format!("step {}: tool '{tool}' flagged by '{entry}'", position + 1));
            }
        }
        Ok(verdict)
    }
}

fn entry_matches(entry: &str, tool: &str) -> bool {
    tool == entry
        || tool
            .strip_prefix(entry)
            .is_some_and(|rest| rest.starts_with('.'))
}
