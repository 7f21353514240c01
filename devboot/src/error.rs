//! Failure taxonomy for the process supervision engine.
//!
//! A non-zero exit from an external command is not an error here: it is
//! reported through [`crate::io::process::ProcessResult::success`] and the caller
//! decides what it means.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The executable could not be launched (not found, permission denied).
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The invocation exceeded its budget. The child was killed; output
    /// captured up to that point is kept for diagnosis.
    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout {
        command: String,
        timeout_secs: u64,
        stdout: String,
        stderr: String,
    },

    /// Compressed dump rejected before anything was spawned.
    #[error(
        "the file is too big to be automatically imported ({size} bytes, limit {limit}). \
         Try to import it by yourself with the following command:\n {manual_command}"
    )]
    FileTooBig {
        size: u64,
        limit: u64,
        manual_command: String,
    },

    #[error("progress total must be positive, got {total}")]
    InvalidTotal { total: u64 },

    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("sync session could not be created: {stderr}")]
    SessionCreationFailed { stderr: String },

    #[error("sync session could not be resumed: {stderr}")]
    SessionResumeFailed { stderr: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
