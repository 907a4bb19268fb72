//! Deterministic structural classification of request text.
//!
//! These checks answer one question: does the text obviously describe one
//! thing to do, or several? They never look at what the request means.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structural shape of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Single,
    Multi,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Single => "single",
            Topology::Multi => "multi",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural pattern that fired, with its fixed confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntacticMatch {
    pub topology: Topology,
    pub confidence: f64,
    pub pattern: &'static str,
}

struct Pattern {
    name: &'static str,
    topology: Topology,
    confidence: f64,
    regex: &'static LazyLock<Regex>,
}

static CREATE_AND_PUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(create|make)\b.+\band\b.+\b(put|place|move|save|add)\b.+\b(in|into|inside)\b")
        .unwrap()
});

static PRONOUN_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(and|then)\b.+\b(it|them|that|there)\b").unwrap());

static SEQUENCING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\b(then|afterwards|after that|followed by|once done|and next)\b|;)").unwrap()
});

static REPEATED_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(open|launch|start)\b\s+\S+.*\band\s+(also\s+)?(open|launch|start)\b")
        .unwrap()
});

static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\b(and|then|also|plus|after|before|while)\b|[,;&])").unwrap());

static PATTERNS: [Pattern; 4] = [
    Pattern {
        name: "create_and_put",
        topology: Topology::Multi,
        confidence: 0.95,
        regex: &CREATE_AND_PUT,
    },
    Pattern {
        name: "pronoun_reference",
        topology: Topology::Multi,
        confidence: 0.95,
        regex: &PRONOUN_REFERENCE,
    },
    Pattern {
        name: "sequencing_marker",
        topology: Topology::Multi,
        confidence: 0.90,
        regex: &SEQUENCING,
    },
    Pattern {
        name: "repeated_open",
        topology: Topology::Multi,
        confidence: 0.90,
        regex: &REPEATED_OPEN,
    },
];

/// Confidence for a request with no conjunction or sequencing marker at all.
const BARE_REQUEST_CONFIDENCE: f64 = 0.90;

/// Classify `text` by structure alone. `None` means no pattern was conclusive.
pub fn classify_structure(text: &str) -> Option<SyntacticMatch> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(pattern) = PATTERNS.iter().find(|pattern| pattern.regex.is_match(text)) {
        return Some(SyntacticMatch {
            topology: pattern.topology,
            confidence: pattern.confidence,
            pattern: pattern.name,
        });
    }

    (!CONJUNCTION.is_match(text)).then_some(SyntacticMatch {
        topology: Topology::Single,
        confidence: BARE_REQUEST_CONFIDENCE,
        pattern: "bare_request",
    })
}
