//! Test-only helpers: a scripted model backend, JSON builders for its answers
//! and a throwaway project directory.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::io::backend::{BackendError, GenerateRequest, ModelBackend, OutputSchema};
use crate::io::config::{PilotConfig, write_config};
use crate::io::init::{InitOptions, PilotPaths, init_pilot};

#[derive(Default)]
struct Script {
    queued: HashMap<OutputSchema, VecDeque<Result<Value, BackendError>>>,
    prompts: HashMap<OutputSchema, Vec<String>>,
}

/// Backend that replays queued answers per schema and records every prompt.
///
/// An empty queue answers `BackendError::Unavailable`.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, schema: OutputSchema, answer: Result<Value, BackendError>) {
        self.lock().queued.entry(schema).or_default().push_back(answer);
    }

    /// Number of requests made for `schema`.
    pub fn calls(&self, schema: OutputSchema) -> usize {
        self.lock().prompts.get(&schema).map_or(0, Vec::len)
    }

    pub fn prompts(&self, schema: OutputSchema) -> Vec<String> {
        self.lock().prompts.get(&schema).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModelBackend for ScriptedBackend {
    fn generate(&self, request: &GenerateRequest) -> Result<Value, BackendError> {
        let mut script = self.lock();
        script
            .prompts
            .entry(request.schema)
            .or_default()
            .push(request.prompt.clone());
        script
            .queued
            .get_mut(&request.schema)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(BackendError::Unavailable(format!(
                    "no scripted {} answer",
                    request.schema.name()
                )))
            })
    }
}

/// One interpreter goal as the backend would return it.
pub fn goal_json(id: &str, domain: &str, verb: &str, object: Option<&str>, scope: &str) -> Value {
    json!({
        "goal_id": id,
        "domain": domain,
        "verb": verb,
        "object": object,
        "params": [],
        "scope": scope,
    })
}

/// Full interpreter answer for `goals`.
pub fn interpreter_answer(goals: Vec<Value>) -> Value {
    json!({ "goals": goals })
}

/// Resolver answer naming `tool` with no extra params.
pub fn resolver_answer(tool: &str, confidence: f64) -> Value {
    json!({ "tool": tool, "confidence": confidence, "params": [] })
}

pub fn gate_answer(classification: &str) -> Value {
    json!({ "classification": classification })
}

/// Temporary project root with an initialized `.pilot/`.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp project")?;
        init_pilot(dir.path(), &InitOptions { force: false })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> PilotPaths {
        PilotPaths::new(self.path())
    }

    /// Replace `.pilot/config.toml` with `cfg`.
    pub fn write_config(&self, cfg: &PilotConfig) -> Result<()> {
        write_config(&self.paths().config_path, cfg)
    }

    /// Write `contents` to `name` under the project root and return its path.
    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}
