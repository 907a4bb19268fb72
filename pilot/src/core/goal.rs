//! Goal-level data model: goals, scope annotations, meta-goals and context frames.
//!
//! Everything here is created once per request and only ever handed out by
//! shared reference afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::types::{Domain, Verb};

/// Where a goal sits relative to other goals or to the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Scope {
    #[default]
    Root,
    /// Inside the target declared by another goal.
    Inside(String),
    /// Anchored on a drive letter.
    Drive(char),
    /// Sequenced after another goal.
    After(String),
}

impl Scope {
    /// Goal reference carried by `inside:` and `after:` scopes.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Scope::Inside(target) | Scope::After(target) => Some(target.as_str()),
            Scope::Root | Scope::Drive(_) => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Root => f.write_str("root"),
            Scope::Inside(target) => write!(f, "inside:{target}"),
            Scope::Drive(letter) => write!(f, "drive:{letter}"),
            Scope::After(target) => write!(f, "after:{target}"),
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("root") {
            return Ok(Scope::Root);
        }
        let (kind, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("invalid scope '{raw}'"))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("scope '{raw}' is missing its target"));
        }
        match kind.trim().to_ascii_lowercase().as_str() {
            "inside" => Ok(Scope::Inside(value.to_string())),
            "after" => Ok(Scope::After(value.to_string())),
            "drive" => {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) if letter.is_ascii_alphabetic() => {
                        Ok(Scope::Drive(letter.to_ascii_uppercase()))
                    }
                    _ => Err(format!("drive scope needs a single letter, got '{value}'")),
                }
            }
            other => Err(format!("unknown scope kind '{other}'")),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

/// Explicit base location derived from a goal's own scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Anchor {
    Drive(char),
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Drive(letter) => write!(f, "DRIVE_{letter}"),
        }
    }
}

impl TryFrom<String> for Anchor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let letter = value
            .strip_prefix("DRIVE_")
            .and_then(|rest| {
                let mut chars = rest.chars();
                match (chars.next(), chars.next()) {
                    (Some(letter), None) if letter.is_ascii_alphabetic() => Some(letter),
                    _ => None,
                }
            })
            .ok_or_else(|| format!("invalid anchor '{value}'"))?;
        Ok(Anchor::Drive(letter.to_ascii_uppercase()))
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.to_string()
    }
}

/// One semantic unit of user intent.
///
/// Fields are public for construction and serde. Once a goal is inside a
/// [`MetaGoal`] built by [`MetaGoal::from_parts`], planning only ever sees it
/// through `&MetaGoal` and never edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub domain: Domain,
    pub verb: Verb,
    /// Declared target (e.g. the folder name being created).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_anchor: Option<Anchor>,
}

impl Goal {
    pub fn new(goal_id: impl Into<String>, domain: Domain, verb: Verb) -> Self {
        Self {
            goal_id: goal_id.into(),
            domain,
            verb,
            object: None,
            params: BTreeMap::new(),
            scope: Scope::Root,
            base_anchor: None,
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_anchor(mut self, anchor: Option<Anchor>) -> Self {
        self.base_anchor = anchor;
        self
    }

    /// `domain.verb` label used in logs, config keys and reports.
    pub fn label(&self) -> String {
        format!("{}.{}", self.domain, self.verb)
    }
}

/// Shape of a decomposed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaType {
    Single,
    IndependentMulti,
    DependentMulti,
}

/// Parent goal indices keyed by child goal index.
pub type Dependencies = BTreeMap<usize, BTreeSet<usize>>;

/// One or more goals plus their dependency structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaGoal {
    pub meta_type: MetaType,
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub dependencies: Dependencies,
}

impl MetaGoal {
    pub fn single(goal: Goal) -> Self {
        Self {
            meta_type: MetaType::Single,
            goals: vec![goal],
            dependencies: Dependencies::new(),
        }
    }

    /// Build a meta-goal and derive `meta_type` from the goal count and edges.
    pub fn from_parts(goals: Vec<Goal>, dependencies: Dependencies) -> Self {
        let dependencies: Dependencies = dependencies
            .into_iter()
            .filter(|(_, parents)| !parents.is_empty())
            .collect();
        let meta_type = if goals.len() == 1 {
            MetaType::Single
        } else if dependencies.is_empty() {
            MetaType::IndependentMulti
        } else {
            MetaType::DependentMulti
        };
        Self {
            meta_type,
            goals,
            dependencies,
        }
    }

    /// Direct parents of `index` (empty when it has none).
    pub fn parents(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependencies
            .get(&index)
            .into_iter()
            .flat_map(|parents| parents.iter().copied())
    }
}

/// Small immutable fact produced by one goal's plan for its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFrame {
    pub domain: Domain,
    pub data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by: Option<String>,
}

impl ContextFrame {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}
