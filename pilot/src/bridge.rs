//! Async entry point for hosts that run on a tokio runtime.
//!
//! The pipeline itself is synchronous: backend calls block on a child
//! process. Each request therefore runs on the blocking pool, and any number
//! of requests can be in flight against one shared [`Pipeline`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::pipeline::{Pipeline, PipelineOutcome};

#[derive(Clone)]
pub struct PipelineBridge {
    pipeline: Arc<Pipeline>,
}

impl PipelineBridge {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Plan `text` without blocking the calling task.
    pub async fn submit(&self, text: impl Into<String>) -> Result<PipelineOutcome> {
        let text = text.into();
        let pipeline = Arc::clone(&self.pipeline);
        debug!(text_len = text.len(), "submitting request to blocking pool");
        let outcome = tokio::task::spawn_blocking(move || pipeline.run(&text))
            .await
            .context("pipeline task panicked or was cancelled")??;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{ConfiguredEligibility, NoDefaults};
    use crate::core::planner::WorldState;
    use crate::io::backend::OutputSchema;
    use crate::io::config::{EligibilityConfig, default_tools};
    use crate::io::registry::ToolRegistry;
    use crate::pipeline::PipelineStatus;
    use crate::test_support::{ScriptedBackend, goal_json, interpreter_answer, resolver_answer};

    fn bridge(backend: Arc<ScriptedBackend>) -> PipelineBridge {
        let pipeline = Pipeline::new(
            backend,
            Box::new(NoDefaults),
            Box::new(ConfiguredEligibility::new(&EligibilityConfig::default())),
            ToolRegistry::new(default_tools()),
            WorldState::default(),
        )
        .expect("pipeline");
        PipelineBridge::new(pipeline)
    }

    #[tokio::test]
    async fn submit_runs_pipeline_off_the_runtime() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push(
            OutputSchema::Interpreter,
            Ok(interpreter_answer(vec![goal_json(
                "g1", "apps", "launch", Some("slack"), "root",
            )])),
        );
        backend.push(OutputSchema::Resolver, Ok(resolver_answer("apps.launch", 0.9)));

        let outcome = bridge(backend).submit("open slack").await.expect("submit");
        assert_eq!(outcome.status, PipelineStatus::Success);
        assert_eq!(outcome.plan.tools(), vec!["apps.launch".to_string()]);
    }

    #[tokio::test]
    async fn pipeline_errors_surface_through_the_bridge() {
        let backend = Arc::new(ScriptedBackend::new());
        let err = bridge(backend).submit("open slack").await.unwrap_err();
        assert!(err.to_string().contains("no scripted interpreter answer"));
    }
}
