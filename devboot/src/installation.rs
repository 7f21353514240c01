//! Orchestration of the environment lifecycle.
//!
//! Each operation turns into one supervised invocation with a progress total
//! sized from the environment descriptor and a classifier suited to the tool's
//! output. A non-zero exit comes back as an unsuccessful [`ProcessResult`]; the
//! caller reports it and stops.

use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::classifier::{
    ImportClassifier, NoProgress, OutputClassifier, StartClassifier, StopClassifier,
};
use crate::core::dump::DumpFormat;
use crate::core::lines::LineRule;
use crate::core::pipeline::{Pipeline, Stage};
use crate::core::session::{SessionAction, plan_activation};
use crate::error::EngineError;
use crate::io::config::{CommandConfig, DevbootConfig};
use crate::io::dump_file::{count_qualifying_lines, file_size};
use crate::io::environment::Environment;
use crate::io::process::{ProcessResult, RunRequest, run_pipeline};
use crate::io::progress::ProgressDisplay;
use crate::io::sync::SyncDaemon;

/// Everything decided about an import before anything is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPlan {
    pub format: DumpFormat,
    pub pipeline: Pipeline,
    /// Size of the dump file on disk.
    pub size: u64,
    /// Progress estimate from the file's qualifying lines.
    pub expected_units: u64,
}

pub struct Installation<'a, S> {
    env: &'a Environment,
    config: &'a DevbootConfig,
    sync: S,
    display: ProgressDisplay,
}

impl<'a, S: SyncDaemon> Installation<'a, S> {
    pub fn new(env: &'a Environment, config: &'a DevbootConfig, sync: S) -> Self {
        Self {
            env,
            config,
            sync,
            display: ProgressDisplay::default(),
        }
    }

    pub fn with_display(mut self, display: ProgressDisplay) -> Self {
        self.display = display;
        self
    }

    /// One unit per container plus network creation, and per volume plus
    /// volume setup when volumes are created too.
    pub fn start_units(&self, include_volumes: bool) -> u64 {
        if include_volumes {
            self.env.container_count() + self.env.volume_count() + 2
        } else {
            self.env.container_count() + 1
        }
    }

    pub fn stop_units(&self) -> u64 {
        self.env.container_count() + 1
    }

    #[instrument(skip(self))]
    pub fn start_environment(&self, include_volumes: bool) -> Result<ProcessResult, EngineError> {
        let units = self.start_units(include_volumes);
        self.invoke("Starting", &self.config.start, units, &StartClassifier)
    }

    #[instrument(skip(self))]
    pub fn build_environment(&self) -> Result<ProcessResult, EngineError> {
        self.invoke("Building", &self.config.build, 1, &NoProgress)
    }

    #[instrument(skip(self))]
    pub fn stop_environment(&self) -> Result<ProcessResult, EngineError> {
        self.invoke("Stopping", &self.config.stop, self.stop_units(), &StopClassifier)
    }

    /// Pick the decompression stage, refuse oversized compressed dumps, and
    /// estimate progress from the decoded dump's qualifying lines.
    pub fn plan_import(&self, database: &str, file: &Path) -> Result<ImportPlan, EngineError> {
        let import = &self.config.import;
        let format = DumpFormat::from_path(file);
        let source = format.source_stage(file);
        let size = file_size(file)?;

        if format.exceeds_size_limit(size, import.max_compressed_bytes) {
            let manual = Pipeline::new(vec![source, self.client_stage(database, false)?])?;
            warn!(size, limit = import.max_compressed_bytes, "compressed dump too big");
            return Err(EngineError::FileTooBig {
                size,
                limit: import.max_compressed_bytes,
                manual_command: manual.render(),
            });
        }

        let lines = count_qualifying_lines(file, format, LineRule::new(import.comment_marker))?;
        let expected_units = format.expected_units(lines);
        let pipeline = Pipeline::new(vec![source, self.client_stage(database, true)?])?.merged();
        debug!(?format, size, lines, expected_units, "import planned");
        Ok(ImportPlan {
            format,
            pipeline,
            size,
            expected_units,
        })
    }

    #[instrument(skip(self))]
    pub fn import_database(&self, database: &str, file: &Path) -> Result<ProcessResult, EngineError> {
        let plan = self.plan_import(database, file)?;
        let classifier = ImportClassifier::new(LineRule::new(self.config.import.comment_marker));
        self.run(
            "Importing",
            plan.pipeline,
            self.config.import.timeout_secs,
            plan.expected_units,
            &classifier,
        )
    }

    /// Bring the sync session to `Active`: create it when missing, resume it
    /// when paused, leave it alone otherwise.
    #[instrument(skip(self))]
    pub fn start_sync_session(&self) -> Result<bool, EngineError> {
        let state = self.sync.session_state()?;
        match plan_activation(state) {
            SessionAction::Create => {
                let result = self.sync.create_session()?;
                if !result.success {
                    warn!(exit_code = ?result.exit_code, "sync session creation failed");
                    return Err(EngineError::SessionCreationFailed {
                        stderr: result.stderr,
                    });
                }
                info!("sync session created");
            }
            SessionAction::Resume => {
                let result = self.sync.resume_session()?;
                if !result.success {
                    warn!(exit_code = ?result.exit_code, "sync session resume failed");
                    return Err(EngineError::SessionResumeFailed {
                        stderr: result.stderr,
                    });
                }
                info!("sync session resumed");
            }
            SessionAction::None => debug!("sync session already active"),
        }
        Ok(true)
    }

    /// Run `content` inside `container`, or through the compose tool when no
    /// container is named. Output comes back unclassified and nothing is drawn.
    #[instrument(skip(self))]
    pub fn exec_command(
        &self,
        content: &str,
        container: Option<&str>,
    ) -> Result<ProcessResult, EngineError> {
        let pipeline = Pipeline::from_argv(&self.exec_argv(content, container)?)?;
        let mut tracker = ProgressDisplay::Hidden.tracker("Executing", 1)?;
        let request = RunRequest::new(pipeline, self.env.root(), self.config.exec.timeout_secs, 1)
            .with_output_limit(self.config.output_limit_bytes);
        let result = run_pipeline(&request, &NoProgress, &mut tracker)?;
        info!(container, success = result.success, "command executed");
        Ok(result)
    }

    /// Argument vector for [`Self::exec_command`]. Inside a container the
    /// content goes to the configured shell as one string; the compose tool
    /// gets it split on whitespace.
    pub fn exec_argv(&self, content: &str, container: Option<&str>) -> Result<Vec<String>, EngineError> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidCommand {
                reason: "nothing to execute".to_string(),
            });
        }
        let exec = &self.config.exec;
        let argv = match container {
            Some(container) => {
                let mut argv = exec.container.clone();
                argv.push(container.to_string());
                argv.extend(exec.shell.iter().cloned());
                argv.push(content.to_string());
                argv
            }
            None => exec
                .global
                .iter()
                .cloned()
                .chain(content.split_whitespace().map(str::to_string))
                .collect(),
        };
        Ok(argv)
    }

    fn client_stage(&self, database: &str, verbose: bool) -> Result<Stage, EngineError> {
        let import = &self.config.import;
        let mut argv = import.client.clone();
        if !import.database_flag.is_empty() {
            argv.push(import.database_flag.clone());
        }
        argv.push(database.to_string());
        if verbose && !import.verbose_flag.is_empty() {
            argv.push(import.verbose_flag.clone());
        }
        Stage::from_argv(&argv)
    }

    fn invoke<C: OutputClassifier>(
        &self,
        label: &str,
        command: &CommandConfig,
        units: u64,
        classifier: &C,
    ) -> Result<ProcessResult, EngineError> {
        let pipeline = Pipeline::from_argv(&command.command)?;
        self.run(label, pipeline, command.timeout_secs, units, classifier)
    }

    fn run<C: OutputClassifier>(
        &self,
        label: &str,
        pipeline: Pipeline,
        timeout_secs: u64,
        units: u64,
        classifier: &C,
    ) -> Result<ProcessResult, EngineError> {
        // An empty estimate still needs a drawable bar.
        let total = units.max(1);
        let mut tracker = self.display.tracker(label, total)?;
        let request = RunRequest::new(pipeline, self.env.root(), timeout_secs, total)
            .with_output_limit(self.config.output_limit_bytes);
        let result = run_pipeline(&request, classifier, &mut tracker)?;
        info!(
            operation = label,
            success = result.success,
            units_observed = result.units_observed,
            total,
            "invocation finished"
        );
        Ok(result)
    }
}
