//! Test-only helpers: scratch environments and a scripted sync daemon.

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::core::session::SessionState;
use crate::error::EngineError;
use crate::io::config::{CommandConfig, DevbootConfig, config_path, write_config};
use crate::io::environment::Environment;
use crate::io::process::ProcessResult;
use crate::io::sync::SyncDaemon;

/// Temporary directory holding a compose file with the requested number of
/// services and volumes.
pub struct TestEnv {
    temp: TempDir,
    env: Environment,
}

impl TestEnv {
    pub fn new(containers: usize, volumes: usize) -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        fs::write(
            temp.path().join("docker-compose.yml"),
            compose_yaml(containers, volumes),
        )
        .context("write compose file")?;
        let env = Environment::locate(temp.path())?;
        Ok(Self { temp, env })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.temp.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Gzip `contents` into `name`.
    pub fn write_gzip(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.temp.path().join(name);
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(contents.as_bytes()).context("compress dump")?;
        encoder.finish().context("finish gzip stream")?;
        Ok(path)
    }

    /// Zip archive `name` holding `contents` as a single `dump.sql` entry.
    pub fn write_zip(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.temp.path().join(name);
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("dump.sql", SimpleFileOptions::default())
            .context("start zip entry")?;
        writer.write_all(contents.as_bytes()).context("write zip entry")?;
        writer.finish().context("finish zip archive")?;
        Ok(path)
    }

    pub fn write_config(&self, cfg: &DevbootConfig) -> Result<()> {
        write_config(&config_path(self.temp.path()), cfg)
    }
}

fn compose_yaml(containers: usize, volumes: usize) -> String {
    let mut yaml = String::from("services:\n");
    for i in 0..containers {
        yaml.push_str(&format!("  service{i}:\n    image: busybox\n"));
    }
    if volumes > 0 {
        yaml.push_str("volumes:\n");
        for i in 0..volumes {
            yaml.push_str(&format!("  volume{i}:\n"));
        }
    }
    yaml
}

/// `sh -c <script>` as an argument vector.
pub fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

pub fn sh_command(script: &str, timeout_secs: u64) -> CommandConfig {
    CommandConfig {
        command: sh(script),
        timeout_secs,
    }
}

/// Transitions requested from a [`ScriptedSyncDaemon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCall {
    Query,
    Create,
    Resume,
}

/// In-memory sync daemon that records every call.
pub struct ScriptedSyncDaemon {
    state: RefCell<SessionState>,
    create_succeeds: bool,
    calls: RefCell<Vec<SyncCall>>,
}

impl ScriptedSyncDaemon {
    pub fn new(state: SessionState) -> Self {
        Self {
            state: RefCell::new(state),
            create_succeeds: true,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.create_succeeds = false;
        self
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }
}

impl SyncDaemon for ScriptedSyncDaemon {
    fn session_state(&self) -> Result<SessionState, EngineError> {
        self.calls.borrow_mut().push(SyncCall::Query);
        Ok(self.state())
    }

    fn create_session(&self) -> Result<ProcessResult, EngineError> {
        self.calls.borrow_mut().push(SyncCall::Create);
        if self.create_succeeds {
            *self.state.borrow_mut() = SessionState::Active;
            Ok(scripted_result(true, ""))
        } else {
            Ok(scripted_result(false, "Error: unable to connect to daemon"))
        }
    }

    fn resume_session(&self) -> Result<ProcessResult, EngineError> {
        self.calls.borrow_mut().push(SyncCall::Resume);
        *self.state.borrow_mut() = SessionState::Active;
        Ok(scripted_result(true, ""))
    }
}

fn scripted_result(success: bool, stderr: &str) -> ProcessResult {
    ProcessResult {
        success,
        exit_code: Some(if success { 0 } else { 1 }),
        stdout: String::new(),
        stderr: stderr.to_string(),
        stdout_truncated: 0,
        stderr_truncated: 0,
        units_observed: 0,
    }
}
