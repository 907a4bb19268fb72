//! Meta-goal load/save helpers with schema + invariant validation.
//!
//! Saved meta-goals let a request be re-planned offline without the backend.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::goal::MetaGoal;
use crate::core::invariants::validate_meta_goal;
use crate::io::config::write_atomic;

const META_GOAL_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/meta_goal.schema.json"
));

/// Load and validate a meta-goal from disk (schema + invariants).
pub fn load_meta_goal(path: &Path) -> Result<MetaGoal> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read meta-goal {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse meta-goal {}", path.display()))?;
    validate_schema(&value)?;
    let meta: MetaGoal = serde_json::from_value(value)
        .with_context(|| format!("deserialize meta-goal {}", path.display()))?;
    validate_invariants(&meta)?;
    Ok(meta)
}

/// Write `meta` as pretty JSON. Refuses meta-goals that break invariants.
pub fn write_meta_goal(path: &Path, meta: &MetaGoal) -> Result<()> {
    validate_invariants(meta)?;
    let mut buf = serde_json::to_string_pretty(meta).context("serialize meta-goal")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(META_GOAL_SCHEMA).context("parse meta-goal schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile meta-goal schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "meta-goal schema validation failed: {}",
        messages.join("; ")
    ))
}

fn validate_invariants(meta: &MetaGoal) -> Result<()> {
    let errors = validate_meta_goal(meta);
    if errors.is_empty() {
        return Ok(());
    }
    Err(anyhow!("meta-goal invariants failed: {}", errors.join("; ")))
}
