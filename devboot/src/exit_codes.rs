//! Stable exit codes for devboot CLI commands.

use crate::error::EngineError;

/// Operation succeeded.
pub const OK: i32 = 0;
/// The external command ran and reported failure, or the engine failed.
pub const FAILED: i32 = 1;
/// No environment found, invalid config, or misuse.
pub const INVALID: i32 = 2;
/// The external command exceeded its time budget and was killed.
pub const TIMEOUT: i32 = 3;
/// Compressed dump above the import size limit.
pub const FILE_TOO_BIG: i32 = 4;

/// Exit code for an error surfaced by a command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Timeout { .. }) => TIMEOUT,
        Some(EngineError::FileTooBig { .. }) => FILE_TOO_BIG,
        Some(EngineError::InvalidTotal { .. } | EngineError::InvalidCommand { .. }) => INVALID,
        Some(_) => FAILED,
        None => INVALID,
    }
}
