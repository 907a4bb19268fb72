//! Scaffolding for the `.pilot/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::io::config::{PilotConfig, write_config};

/// Canonical paths within `.pilot/` for a project root.
#[derive(Debug, Clone)]
pub struct PilotPaths {
    pub root: PathBuf,
    pub pilot_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl PilotPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let pilot_dir = root.join(".pilot");
        Self {
            root,
            config_path: pilot_dir.join("config.toml"),
            gitignore_path: pilot_dir.join(".gitignore"),
            pilot_dir,
        }
    }

    /// Backend scratch directory named by `cfg`, resolved against the root.
    pub fn state_dir(&self, cfg: &PilotConfig) -> PathBuf {
        self.root.join(&cfg.state_dir)
    }
}

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Overwrite an existing `.pilot/config.toml`.
    pub force: bool,
}

/// Create `.pilot/` with a default config. Fails if the config already exists
/// unless `options.force` is set.
pub fn init_pilot(root: &Path, options: &InitOptions) -> Result<PilotPaths> {
    let paths = PilotPaths::new(root);
    if paths.pilot_dir.exists() && !paths.pilot_dir.is_dir() {
        return Err(anyhow!("pilot init: .pilot exists but is not a directory"));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "pilot init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    let cfg = PilotConfig::default();
    fs::create_dir_all(paths.state_dir(&cfg))
        .with_context(|| format!("create directory {}", paths.state_dir(&cfg).display()))?;
    write_config(&paths.config_path, &cfg)?;
    fs::write(&paths.gitignore_path, PILOT_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    info!(root = %root.display(), "initialized .pilot");
    Ok(paths)
}

const PILOT_GITIGNORE: &str = "state/\n";
