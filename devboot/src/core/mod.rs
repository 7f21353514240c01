//! Deterministic, pure logic behind the supervision engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod dump;
pub mod lines;
pub mod pipeline;
pub mod progress;
pub mod session;
