//! Goal-driven request planner for desktop automation.
//!
//! A natural-language request is turned into an ordered, fully resolved
//! sequence of tool invocations. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic planning (rules, scope, orchestration,
//!   invariants). No I/O and no model calls.
//! - **[`io`]**: Side-effecting boundaries (config, child processes, model
//!   backend, prompt rendering).
//! - **[`agents`]**: Model-backed stages (gate, interpreter, resolver) built on
//!   the [`io`] backend.
//!
//! [`pipeline`] wires the stages together; [`bridge`] exposes it to async hosts.

pub mod agents;
pub mod authority;
pub mod bridge;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
