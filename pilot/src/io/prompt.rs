//! Prompt rendering for backend calls.

use std::collections::BTreeMap;

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{ActionClass, Domain, Intent, Verb};
use crate::io::registry::ToolSpec;

const GATE_TEMPLATE: &str = include_str!("prompts/gate.md");
const INTERPRETER_TEMPLATE: &str = include_str!("prompts/interpreter.md");
const RESOLVER_TEMPLATE: &str = include_str!("prompts/resolver.md");

/// Topology hint passed to the interpreter prompt.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyHint<'a> {
    pub classification: &'a str,
    pub confidence: f64,
    /// Whether the interpreter's goal count will be checked against it.
    pub binding: bool,
}

/// Step passed to the resolver prompt.
#[derive(Debug, Clone, Serialize)]
pub struct ResolverStep<'a> {
    pub description: &'a str,
    pub intent: Intent,
    pub action_class: Option<ActionClass>,
    pub args: &'a BTreeMap<String, String>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("gate", GATE_TEMPLATE)?;
        env.add_template("interpreter", INTERPRETER_TEMPLATE)?;
        env.add_template("resolver", RESOLVER_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render_gate(&self, text: &str) -> Result<String, minijinja::Error> {
        self.env
            .get_template("gate")?
            .render(context! { text => text.trim() })
    }

    pub fn render_interpreter(
        &self,
        text: &str,
        gate: Option<&TopologyHint<'_>>,
    ) -> Result<String, minijinja::Error> {
        let domains: Vec<&str> = Domain::ALL.iter().map(Domain::as_str).collect();
        let verbs: Vec<&str> = Verb::ALL.iter().map(Verb::as_str).collect();
        self.env.get_template("interpreter")?.render(context! {
            text => text.trim(),
            domains => domains,
            verbs => verbs,
            gate => gate,
        })
    }

    pub fn render_resolver(
        &self,
        step: &ResolverStep<'_>,
        candidates: &[&ToolSpec],
    ) -> Result<String, minijinja::Error> {
        self.env.get_template("resolver")?.render(context! {
            description => step.description,
            intent => step.intent,
            action_class => step.action_class,
            args => step.args,
            candidates => candidates,
        })
    }
}
