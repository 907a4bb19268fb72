//! Pilot configuration stored at `.pilot/config.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{ActionClass, Domain, Verb};
use crate::io::registry::ToolSpec;

/// Pilot configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to a
/// runnable setup with the built-in desktop tool registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    /// Directory for backend scratch files (schemas, last-message outputs).
    pub state_dir: PathBuf,

    pub backend: BackendConfig,

    pub eligibility: EligibilityConfig,

    /// Anchor token (`DRIVE_D`) to the concrete location the executor uses.
    pub anchors: BTreeMap<String, String>,

    /// Semantic defaults keyed by `domain.verb`, then param name.
    pub defaults: BTreeMap<String, BTreeMap<String, String>>,

    /// Tool registry offered to the resolver.
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Command that answers one structured prompt (e.g. `["codex","exec"]`).
    pub command: Vec<String>,

    /// Wall-clock budget for one backend call in seconds.
    pub timeout_secs: u64,

    /// Truncate backend stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string()],
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

/// Tool names or `domain` prefixes that the configured eligibility authority
/// blocks or flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EligibilityConfig {
    pub deny: Vec<String>,
    pub warn: Vec<String>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".pilot/state"),
            backend: BackendConfig::default(),
            eligibility: EligibilityConfig {
                deny: vec!["shell".to_string()],
                warn: vec!["files.delete_path".to_string(), "input".to_string()],
            },
            anchors: BTreeMap::new(),
            defaults: BTreeMap::from([(
                "files.create".to_string(),
                BTreeMap::from([("location".to_string(), "Desktop".to_string())]),
            )]),
            tools: default_tools(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.output_limit_bytes == 0 {
            return Err(anyhow!("backend.output_limit_bytes must be > 0"));
        }
        if self
            .backend
            .command
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!("backend.command must be a non-empty array"));
        }

        let mut names = BTreeSet::new();
        for tool in &self.tools {
            if !tool.name.contains('.') {
                return Err(anyhow!(
                    "tool '{}' must be named '<domain>.<name>'",
                    tool.name
                ));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(anyhow!("tool '{}' is declared twice", tool.name));
            }
        }

        for key in self.defaults.keys() {
            let (domain, verb) = key
                .split_once('.')
                .ok_or_else(|| anyhow!("defaults key '{key}' must be '<domain>.<verb>'"))?;
            Domain::from_str(domain).map_err(|err| anyhow!("defaults key '{key}': {err}"))?;
            Verb::from_str(verb).map_err(|err| anyhow!("defaults key '{key}': {err}"))?;
        }

        if let Some(empty) = self.anchors.iter().find(|(token, path)| {
            token.trim().is_empty() || path.trim().is_empty()
        }) {
            return Err(anyhow!("anchor '{}' must map to a non-empty path", empty.0));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write via a uniquely named sibling temp file and rename, so concurrent
/// readers only ever see a complete file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_string_lossy();
    let tmp_path = parent.join(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    Ok(())
}

fn tool(
    name: &str,
    action_class: ActionClass,
    description: &str,
    semantic: &[&str],
) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        action_class,
        required_semantic_inputs: semantic.iter().map(|input| input.to_string()).collect(),
    }
}

/// Built-in desktop tool registry written by `pilot init`.
pub fn default_tools() -> Vec<ToolSpec> {
    use ActionClass::{Actuate, Observe, Query};

    vec![
        tool("files.create_folder", Actuate, "Create a folder at a location", &["name", "location"]),
        tool("files.create_file", Actuate, "Create an empty file at a location", &["name", "location"]),
        tool("files.open_path", Actuate, "Open a file or folder with its default application", &["path"]),
        tool("files.delete_path", Actuate, "Move a file or folder to the trash", &["path"]),
        tool("files.list_dir", Observe, "List the entries of a folder", &["location"]),
        tool("browser.open_url", Actuate, "Open a URL in the default browser", &["url"]),
        tool("browser.search_web", Actuate, "Run a web search and show the results", &["query"]),
        tool("system.set_volume", Actuate, "Set the output volume", &["value"]),
        tool("system.set_brightness", Actuate, "Set the display brightness", &["value"]),
        tool("system.read_status", Observe, "Read volume, brightness or battery level", &["setting"]),
        tool("clipboard.write_text", Actuate, "Place text or a file path on the clipboard", &["content"]),
        tool("clipboard.read_text", Query, "Return the current clipboard text", &[]),
        tool("screen.capture", Observe, "Capture the screen or the focused window", &["region"]),
        tool("apps.launch", Actuate, "Launch an installed application", &["app"]),
        tool("apps.quit", Actuate, "Quit a running application", &["app"]),
        tool("input.type_text", Actuate, "Type text into the focused window", &["text"]),
        tool("shell.run", Actuate, "Run a shell command", &["command"]),
    ]
}
