//! I/O boundaries: configuration, model backends, child processes and prompts.

pub mod backend;
pub mod config;
pub mod goal_store;
pub mod init;
pub mod process;
pub mod prompt;
pub mod registry;
