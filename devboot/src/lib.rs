//! Local development environment bootstrapper.
//!
//! Drives external tools (container orchestrator, build tool, database client,
//! file-sync daemon) and turns their free-text output into a bounded progress
//! indicator. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (progress counting, output
//!   classification, dump formats, pipelines, session transitions).
//! - **[`io`]**: Side-effecting adapters (process supervision, terminal
//!   rendering, config, environment location, sync daemon).
//!
//! [`installation`] composes both into the environment lifecycle operations.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod installation;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
