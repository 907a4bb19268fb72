//! Model backend abstraction.
//!
//! The [`ModelBackend`] trait decouples the gate, interpreter and resolver
//! from the process that actually answers prompts (currently a `codex exec`
//! style command). Tests use scripted backends that return predetermined
//! JSON without spawning processes.
//!
//! Every response passes through [`generate_structured`], which validates it
//! against the request's JSON Schema before deserializing it. No other code
//! parses backend output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{PilotConfig, write_atomic};
use crate::io::process::run_command_with_timeout;

/// Response shapes the backend can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputSchema {
    Gate,
    Interpreter,
    Resolver,
}

const GATE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/gate.schema.json"
));
const INTERPRETER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/interpreter.schema.json"
));
const RESOLVER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/resolver.schema.json"
));

impl OutputSchema {
    pub fn name(&self) -> &'static str {
        match self {
            OutputSchema::Gate => "gate",
            OutputSchema::Interpreter => "interpreter",
            OutputSchema::Resolver => "resolver",
        }
    }

    /// Raw JSON Schema text.
    pub fn source(&self) -> &'static str {
        match self {
            OutputSchema::Gate => GATE_SCHEMA,
            OutputSchema::Interpreter => INTERPRETER_SCHEMA,
            OutputSchema::Resolver => RESOLVER_SCHEMA,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub schema: OutputSchema,
    pub prompt: String,
}

impl GenerateRequest {
    pub fn new(schema: OutputSchema, prompt: impl Into<String>) -> Self {
        Self {
            schema,
            prompt: prompt.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached at all (spawn failure, timeout).
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    /// The backend ran but reported failure.
    #[error("model backend failed: {0}")]
    Failed(String),
    /// The backend answered with something that does not fit the schema.
    #[error("invalid {schema} output: {message}")]
    InvalidOutput {
        schema: &'static str,
        message: String,
    },
}

/// Produces one structured JSON answer per prompt.
pub trait ModelBackend: Send + Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<Value, BackendError>;
}

/// Ask the backend and return its answer as `T`, validated against the
/// request's schema first.
#[instrument(skip_all, fields(schema = request.schema.name()))]
pub fn generate_structured<T: DeserializeOwned>(
    backend: &dyn ModelBackend,
    request: &GenerateRequest,
) -> Result<T, BackendError> {
    let value = backend.generate(request)?;
    validate_output(request.schema, &value)?;
    serde_json::from_value(value).map_err(|err| BackendError::InvalidOutput {
        schema: request.schema.name(),
        message: err.to_string(),
    })
}

/// Validate `instance` against `schema` (Draft 2020-12).
pub fn validate_output(schema: OutputSchema, instance: &Value) -> Result<(), BackendError> {
    let invalid = |message: String| BackendError::InvalidOutput {
        schema: schema.name(),
        message,
    };
    let schema_json: Value = serde_json::from_str(schema.source())
        .map_err(|err| invalid(format!("schema does not parse: {err}")))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema_json)
        .map_err(|err| invalid(format!("schema does not compile: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if messages.is_empty() {
        Ok(())
    } else {
        debug!(errors = messages.len(), "backend output failed schema validation");
        Err(invalid(messages.join("; ")))
    }
}

/// Backend that spawns a configured command per request.
///
/// The command receives the prompt on stdin and is invoked as
/// `<command…> --output-schema <schema> --output-last-message <out> -`.
/// It must write its final JSON answer to `<out>`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: Vec<String>,
    state_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

impl CommandBackend {
    pub fn new(
        command: Vec<String>,
        state_dir: impl Into<PathBuf>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            command,
            state_dir: state_dir.into(),
            timeout,
            output_limit_bytes,
        }
    }

    /// Build from config, resolving a relative `state_dir` against `root`.
    pub fn from_config(cfg: &PilotConfig, root: &Path) -> Self {
        Self::new(
            cfg.backend.command.clone(),
            root.join(&cfg.state_dir),
            Duration::from_secs(cfg.backend.timeout_secs),
            cfg.backend.output_limit_bytes,
        )
    }

    /// Concurrent requests share these files; an unchanged schema is left in
    /// place and a changed one is replaced atomically.
    fn write_schema(&self, schema: OutputSchema) -> Result<PathBuf, BackendError> {
        let path = self
            .state_dir
            .join("schemas")
            .join(format!("{}.schema.json", schema.name()));
        if fs::read_to_string(&path).is_ok_and(|current| current == schema.source()) {
            return Ok(path);
        }
        write_atomic(&path, schema.source())
            .map_err(|err| BackendError::Unavailable(format!("{err:#}")))?;
        Ok(path)
    }

    fn output_path(&self, schema: OutputSchema) -> PathBuf {
        let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.state_dir.join("outputs").join(format!(
            "{}-{}-{seq}.json",
            schema.name(),
            std::process::id()
        ))
    }
}

impl ModelBackend for CommandBackend {
    #[instrument(skip_all, fields(schema = request.schema.name(), timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, request: &GenerateRequest) -> Result<Value, BackendError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BackendError::Unavailable("backend command is empty".to_string()))?;

        let schema_path = self.write_schema(request.schema)?;
        let output_path = self.output_path(request.schema);
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BackendError::Unavailable(format!("create {}: {err}", parent.display()))
            })?;
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-");

        info!(program = %program, "invoking model backend");
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| BackendError::Unavailable(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "model backend timed out");
            return Err(BackendError::Unavailable(format!(
                "timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model backend failed");
            return Err(BackendError::Failed(format!(
                "exit status {:?}: {}",
                output.status.code(),
                output.stderr_tail(400)
            )));
        }

        let contents = fs::read_to_string(&output_path).map_err(|err| {
            BackendError::Failed(format!(
                "missing backend output {}: {err}",
                output_path.display()
            ))
        })?;
        if let Err(err) = fs::remove_file(&output_path) {
            warn!(err = %err, path = %output_path.display(), "failed to remove backend output");
        }

        let value = serde_json::from_str(contents.trim()).map_err(|err| {
            BackendError::InvalidOutput {
                schema: request.schema.name(),
                message: format!("not JSON: {err}"),
            }
        })?;
        debug!("model backend answered");
        Ok(value)
    }
}
