//! Deterministic, pure logic shared by the pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod dag;
pub mod goal;
pub mod invariants;
pub mod ledger;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod rules;
pub mod scope;
pub mod tool_policy;
pub mod types;
