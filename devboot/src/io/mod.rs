//! I/O adapters: processes, terminal, files, and the sync daemon.

pub mod config;
pub mod dump_file;
pub mod environment;
pub mod prerequisites;
pub mod process;
pub mod progress;
pub mod sync;
