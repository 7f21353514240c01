//! Adapter for the file-synchronization daemon.
//!
//! The [`SyncDaemon`] trait is the seam the orchestrator talks through; tests
//! substitute a scripted daemon instead of spawning the real CLI.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::classifier::NoProgress;
use crate::core::pipeline::Pipeline;
use crate::core::session::{SessionState, parse_listing};
use crate::error::EngineError;
use crate::io::config::SyncConfig;
use crate::io::process::{ProcessResult, RunRequest, run_pipeline};
use crate::io::progress::ProgressTracker;

pub trait SyncDaemon {
    /// Current session state as reported by the daemon right now.
    fn session_state(&self) -> Result<SessionState, EngineError>;
    fn create_session(&self) -> Result<ProcessResult, EngineError>;
    fn resume_session(&self) -> Result<ProcessResult, EngineError>;
}

impl<T: SyncDaemon + ?Sized> SyncDaemon for &T {
    fn session_state(&self) -> Result<SessionState, EngineError> {
        (**self).session_state()
    }

    fn create_session(&self) -> Result<ProcessResult, EngineError> {
        (**self).create_session()
    }

    fn resume_session(&self) -> Result<ProcessResult, EngineError> {
        (**self).resume_session()
    }
}

/// Drives the daemon through its command-line client.
#[derive(Debug, Clone)]
pub struct CliSyncDaemon {
    config: SyncConfig,
    workdir: PathBuf,
}

impl CliSyncDaemon {
    pub fn new(config: SyncConfig, workdir: &Path) -> Self {
        Self {
            config,
            workdir: workdir.to_path_buf(),
        }
    }

    fn run(&self, argv: &[String]) -> Result<ProcessResult, EngineError> {
        let request = RunRequest::new(
            Pipeline::from_argv(argv)?,
            &self.workdir,
            self.config.timeout_secs,
            1,
        );
        let mut tracker = ProgressTracker::hidden(1)?;
        run_pipeline(&request, &NoProgress, &mut tracker)
    }
}

impl SyncDaemon for CliSyncDaemon {
    #[instrument(skip_all)]
    fn session_state(&self) -> Result<SessionState, EngineError> {
        let listing = self.run(&self.config.list)?;
        let state = parse_listing(listing.success, &listing.stdout);
        debug!(?state, "sync session state");
        Ok(state)
    }

    #[instrument(skip_all)]
    fn create_session(&self) -> Result<ProcessResult, EngineError> {
        self.run(&self.config.create)
    }

    #[instrument(skip_all)]
    fn resume_session(&self) -> Result<ProcessResult, EngineError> {
        self.run(&self.config.resume)
    }
}
