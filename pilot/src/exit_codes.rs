//! Stable exit codes for pilot CLI commands.

/// Every goal planned and resolved, and the tool sequence is eligible.
pub const OK: i32 = 0;
/// Invalid config, input file or backend failure.
pub const INVALID: i32 = 1;
/// Some goals failed or were skipped; the rest have a plan.
pub const PARTIAL: i32 = 2;
/// No goal produced a plan.
pub const FAILURE: i32 = 3;
/// A plan exists but the eligibility authority refused it.
pub const BLOCKED: i32 = 4;
