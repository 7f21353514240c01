//! Bootstrapper configuration stored under `.devboot/config.toml`.
//!
//! Argument vectors for the wrapped tools live here: they are data, not engine
//! behavior.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::lines::DEFAULT_COMMENT_MARKER;
use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const CONFIG_DIR: &str = ".devboot";
pub const CONFIG_FILE: &str = "config.toml";

/// Compressed dumps above this size are refused.
pub const DEFAULT_MAX_COMPRESSED_BYTES: u64 = 100_000_000;

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Bootstrapper configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevbootConfig {
    /// Keep at most this many bytes of each captured stream.
    pub output_limit_bytes: usize,

    pub start: CommandConfig,
    pub build: CommandConfig,
    pub stop: CommandConfig,
    pub import: ImportConfig,
    pub sync: SyncConfig,
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl CommandConfig {
    fn new(command: &[&str], timeout_secs: u64) -> Self {
        Self {
            command: argv(command),
            timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportConfig {
    /// Database client, without the database selection or verbosity flags.
    pub client: Vec<String>,
    pub database_flag: String,
    /// Makes the client echo statements so there is something to classify.
    pub verbose_flag: String,
    pub timeout_secs: u64,
    pub max_compressed_bytes: u64,
    /// Lines starting with this character are not counted as progress.
    pub comment_marker: char,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            client: argv(&["mysql", "-h", "127.0.0.1", "-u", "root"]),
            database_flag: "-D".to_string(),
            verbose_flag: "-v".to_string(),
            timeout_secs: 3600,
            max_compressed_bytes: DEFAULT_MAX_COMPRESSED_BYTES,
            comment_marker: DEFAULT_COMMENT_MARKER,
        }
    }
}

/// File-synchronization daemon commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub list: Vec<String>,
    pub create: Vec<String>,
    pub resume: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            list: argv(&["mutagen", "sync", "list", "devboot"]),
            create: argv(&[
                "mutagen",
                "sync",
                "create",
                "--name=devboot",
                "--sync-mode=two-way-resolved",
                "--ignore-vcs",
                ".",
                "docker://devboot_sync/var/www/html",
            ]),
            resume: argv(&["mutagen", "sync", "resume", "devboot"]),
            timeout_secs: 60,
        }
    }
}

/// Ad-hoc commands run in a container or through the compose tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecConfig {
    /// Prefix for running inside a container; the container name follows.
    pub container: Vec<String>,
    /// Interpreter handed the command string inside the container.
    pub shell: Vec<String>,
    /// Prefix for commands addressed to the compose tool itself.
    pub global: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            container: argv(&["docker-compose", "exec", "-T"]),
            shell: argv(&["sh", "-c"]),
            global: argv(&["docker-compose"]),
            timeout_secs: 600,
        }
    }
}

impl Default for DevbootConfig {
    fn default() -> Self {
        Self {
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            start: CommandConfig::new(&["make", "start"], 30),
            build: CommandConfig::new(&["make", "build"], 30 * 60),
            stop: CommandConfig::new(&["make", "stop"], 60),
            import: ImportConfig::default(),
            sync: SyncConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

impl DevbootConfig {
    pub fn validate(&self) -> Result<()> {
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        for (name, cmd) in [("start", &self.start), ("build", &self.build), ("stop", &self.stop)] {
            validate_argv(&format!("{name}.command"), &cmd.command)?;
            if cmd.timeout_secs == 0 {
                return Err(anyhow!("{name}.timeout_secs must be > 0"));
            }
        }

        validate_argv("import.client", &self.import.client)?;
        if self.import.timeout_secs == 0 {
            return Err(anyhow!("import.timeout_secs must be > 0"));
        }
        if self.import.max_compressed_bytes == 0 {
            return Err(anyhow!("import.max_compressed_bytes must be > 0"));
        }
        if !self.import.comment_marker.is_ascii() || self.import.comment_marker == '\n' {
            return Err(anyhow!(
                "import.comment_marker must be a single ASCII character other than newline"
            ));
        }

        validate_argv("sync.list", &self.sync.list)?;
        validate_argv("sync.create", &self.sync.create)?;
        validate_argv("sync.resume", &self.sync.resume)?;
        if self.sync.timeout_secs == 0 {
            return Err(anyhow!("sync.timeout_secs must be > 0"));
        }

        validate_argv("exec.container", &self.exec.container)?;
        validate_argv("exec.global", &self.exec.global)?;
        if self.exec.timeout_secs == 0 {
            return Err(anyhow!("exec.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

fn validate_argv(field: &str, argv: &[String]) -> Result<()> {
    match argv.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("{field} must be a non-empty array")),
    }
}

fn argv(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DevbootConfig::default()`.
pub fn load_config(path: &Path) -> Result<DevbootConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = DevbootConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DevbootConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &DevbootConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
