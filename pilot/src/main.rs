//! Goal-driven request planner.
//!
//! Reads `.pilot/config.toml` under `--root`, talks to the configured model
//! backend, and prints the resulting plan. `plan` and `rules` never call the
//! backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use pilot::agents::gate::DecompositionGate;
use pilot::authority::ConfiguredDefaults;
use pilot::core::invariants::validate_plan_graph;
use pilot::core::orchestrator::GoalOrchestrator;
use pilot::core::plan::OrchestrationStatus;
use pilot::core::planner::{GoalPlanner, WorldState};
use pilot::core::rules::{Capability, Rule};
use pilot::exit_codes;
use pilot::io::backend::CommandBackend;
use pilot::io::config::{PilotConfig, load_config};
use pilot::io::goal_store::{load_meta_goal, write_meta_goal};
use pilot::io::init::{InitOptions, PilotPaths, init_pilot};
use pilot::io::prompt::PromptEngine;
use pilot::io::registry::ToolRegistry;
use pilot::logging;
use pilot::pipeline::{Pipeline, PipelineStatus};
use pilot::report::render_summary;

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Plan natural-language desktop requests into ordered tool calls"
)]
struct Cli {
    /// Project root containing `.pilot/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.pilot/config.toml` with defaults.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Classify a request as single or multi without planning it.
    Classify { text: String },
    /// Plan a request end to end and print the executable plan.
    Run {
        text: String,
        /// Print the full outcome as JSON instead of a summary.
        #[arg(long)]
        json: bool,
        /// Also save the interpreted meta-goal for offline `plan`.
        #[arg(long, value_name = "PATH")]
        save_goal: Option<PathBuf>,
    },
    /// Orchestrate a saved meta-goal JSON file without the model backend.
    Plan { file: PathBuf },
    /// Print the planning rule table.
    Rules,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Classify { text } => cmd_classify(&cli.root, &text),
        Command::Run {
            text,
            json,
            save_goal,
        } => cmd_run(&cli.root, &text, json, save_goal.as_deref()),
        Command::Plan { file } => cmd_plan(&cli.root, &file),
        Command::Rules => cmd_rules(),
    }
}

fn load_project_config(root: &Path) -> Result<PilotConfig> {
    let paths = PilotPaths::new(root);
    load_config(&paths.config_path).context("load .pilot/config.toml")
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_pilot(root, &InitOptions { force })?;
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_classify(root: &Path, text: &str) -> Result<i32> {
    let cfg = load_project_config(root)?;
    let backend = CommandBackend::from_config(&cfg, root);
    let prompts = PromptEngine::new().context("load prompt templates")?;
    let output = DecompositionGate::new(&backend, &prompts).classify(text);
    print_json(&output)?;
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, text: &str, json: bool, save_goal: Option<&Path>) -> Result<i32> {
    let cfg = load_project_config(root)?;
    let backend = Arc::new(CommandBackend::from_config(&cfg, root));
    let pipeline = Pipeline::from_config(&cfg, backend)?;
    let outcome = pipeline.run(text)?;

    if let Some(path) = save_goal {
        write_meta_goal(path, &outcome.meta_goal)
            .with_context(|| format!("save meta-goal to {}", path.display()))?;
    }
    if json {
        print_json(&outcome)?;
    } else {
        print!("{}", render_summary(&outcome));
    }

    Ok(match outcome.status {
        PipelineStatus::Success => exit_codes::OK,
        PipelineStatus::Partial => exit_codes::PARTIAL,
        PipelineStatus::Failure => exit_codes::FAILURE,
        PipelineStatus::Blocked => exit_codes::BLOCKED,
    })
}

fn cmd_plan(root: &Path, file: &Path) -> Result<i32> {
    let cfg = load_project_config(root)?;
    let meta = load_meta_goal(file)?;
    let defaults = ConfiguredDefaults::new(cfg.defaults.clone());
    let world = WorldState {
        anchor_paths: cfg.anchors.clone(),
    };
    let orchestrator = GoalOrchestrator::new(
        GoalPlanner::new(&defaults),
        ToolRegistry::from_config(&cfg).capability_set(),
    );
    let result = orchestrator.orchestrate(&meta, &world);
    if let Some(graph) = &result.graph {
        let errors = validate_plan_graph(graph);
        if !errors.is_empty() {
            bail!("plan graph violates invariants: {}", errors.join("; "));
        }
    }
    print_json(&result)?;

    Ok(match result.status {
        OrchestrationStatus::Success => exit_codes::OK,
        OrchestrationStatus::Partial => exit_codes::PARTIAL,
        OrchestrationStatus::Failure => exit_codes::FAILURE,
    })
}

#[derive(Serialize)]
struct RuleEntry {
    capability: Capability,
    rule: &'static Rule,
}

fn cmd_rules() -> Result<i32> {
    let entries: Vec<RuleEntry> = Capability::ALL
        .into_iter()
        .map(|capability| RuleEntry {
            capability,
            rule: capability.rule(),
        })
        .collect();
    print_json(&entries)?;
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["pilot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_run_with_flags() {
        let cli = Cli::parse_from([
            "pilot",
            "--root",
            "/tmp/project",
            "run",
            "take a screenshot",
            "--json",
            "--save-goal",
            "goal.json",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        match cli.command {
            Command::Run {
                text,
                json,
                save_goal,
            } => {
                assert_eq!(text, "take a screenshot");
                assert!(json);
                assert_eq!(save_goal, Some(PathBuf::from("goal.json")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rule_table_serializes() {
        let entries: Vec<RuleEntry> = Capability::ALL
            .into_iter()
            .map(|capability| RuleEntry {
                capability,
                rule: capability.rule(),
            })
            .collect();
        let value = serde_json::to_value(&entries).expect("json");
        assert_eq!(value[0]["capability"], "files_create");
    }
}
