//! Decomposition gate: is this one request or several?
//!
//! The gate only ever reasons about structure. Obvious cases are settled by
//! [`classify_structure`]; the rest go to the backend. The gate never fails:
//! any backend problem degrades to a low-confidence `single`, which is below
//! the authority threshold and therefore never constrains the interpreter.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::classifier::{Topology, classify_structure};
use crate::io::backend::{GenerateRequest, ModelBackend, OutputSchema, generate_structured};
use crate::io::prompt::PromptEngine;

/// Confidence at or above which the interpreter must honor the classification.
pub const TOPOLOGY_AUTHORITY_THRESHOLD: f64 = 0.85;

/// Confidence assigned to backend classifications.
pub const MODEL_CONFIDENCE: f64 = 0.75;

/// Confidence assigned when the backend could not answer.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMethod {
    Syntactic,
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutput {
    pub classification: Topology,
    pub confidence: f64,
    pub method: GateMethod,
}

impl GateOutput {
    /// Whether the classification binds the interpreter's goal count.
    pub fn is_authoritative(&self) -> bool {
        self.confidence >= TOPOLOGY_AUTHORITY_THRESHOLD
    }
}

#[derive(Debug, Deserialize)]
struct GateAnswer {
    classification: Topology,
}

pub struct DecompositionGate<'a> {
    backend: &'a dyn ModelBackend,
    prompts: &'a PromptEngine,
}

impl<'a> DecompositionGate<'a> {
    pub fn new(backend: &'a dyn ModelBackend, prompts: &'a PromptEngine) -> Self {
        Self { backend, prompts }
    }

    #[instrument(skip_all, fields(text_len = text.len()))]
    pub fn classify(&self, text: &str) -> GateOutput {
        if let Some(found) = classify_structure(text) {
            debug!(pattern = found.pattern, classification = %found.topology, "syntactic gate match");
            return GateOutput {
                classification: found.topology,
                confidence: found.confidence,
                method: GateMethod::Syntactic,
            };
        }

        let prompt = match self.prompts.render_gate(text) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(err = %err, "gate prompt failed to render; falling back");
                return fallback();
            }
        };
        let request = GenerateRequest::new(OutputSchema::Gate, prompt);
        match generate_structured::<GateAnswer>(self.backend, &request) {
            Ok(answer) => {
                debug!(classification = %answer.classification, "model gate answer");
                GateOutput {
                    classification: answer.classification,
                    confidence: MODEL_CONFIDENCE,
                    method: GateMethod::Model,
                }
            }
            Err(err) => {
                warn!(err = %err, "gate backend failed; falling back");
                fallback()
            }
        }
    }
}

fn fallback() -> GateOutput {
    GateOutput {
        classification: Topology::Single,
        confidence: FALLBACK_CONFIDENCE,
        method: GateMethod::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::backend::BackendError;
    use crate::test_support::{ScriptedBackend, gate_answer};
    use serde_json::json;

    fn classify(backend: &ScriptedBackend, text: &str) -> GateOutput {
        let prompts = PromptEngine::new().expect("prompts");
        DecompositionGate::new(backend, &prompts).classify(text)
    }

    #[test]
    fn syntactic_match_skips_backend() {
        let backend = ScriptedBackend::new();
        let output = classify(&backend, "take a screenshot and copy it");
        assert_eq!(output.classification, Topology::Multi);
        assert_eq!(output.method, GateMethod::Syntactic);
        assert!(output.is_authoritative());
        assert_eq!(backend.calls(OutputSchema::Gate), 0);
    }

    #[test]
    fn ambiguous_text_asks_backend_at_fixed_confidence() {
        let backend = ScriptedBackend::new();
        backend.push(OutputSchema::Gate, Ok(gate_answer("multi")));
        let output = classify(&backend, "search for cats and dogs");
        assert_eq!(output.classification, Topology::Multi);
        assert_eq!(output.method, GateMethod::Model);
        assert!((output.confidence - MODEL_CONFIDENCE).abs() < f64::EPSILON);
        assert!(!output.is_authoritative());
        assert!(backend.prompts(OutputSchema::Gate)[0].contains("search for cats and dogs"));
    }

    #[test]
    fn backend_failure_degrades_to_non_binding_single() {
        let backend = ScriptedBackend::new();
        backend.push(
            OutputSchema::Gate,
            Err(BackendError::Unavailable("offline".to_string())),
        );
        let output = classify(&backend, "search for cats and dogs");
        assert_eq!(output.classification, Topology::Single);
        assert_eq!(output.method, GateMethod::Fallback);
        assert!(!output.is_authoritative());
    }

    #[test]
    fn malformed_answer_degrades_to_fallback() {
        let backend = ScriptedBackend::new();
        backend.push(OutputSchema::Gate, Ok(json!({"classification": 3})));
        let output = classify(&backend, "search for cats and dogs");
        assert_eq!(output.method, GateMethod::Fallback);
    }
}
