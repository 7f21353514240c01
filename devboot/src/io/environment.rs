//! Environment descriptor: where the stack lives and how big it is.
//!
//! Located once at startup by walking up from the working directory until a
//! compose file shows up, then passed by reference wherever counts are needed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info};

/// Files that mark an environment root, in lookup order.
pub const COMPOSE_MARKERS: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    root: PathBuf,
    compose_file: PathBuf,
    container_count: u64,
    volume_count: u64,
}

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    volumes: Option<BTreeMap<String, serde_yaml::Value>>,
}

impl Environment {
    pub fn new(root: impl Into<PathBuf>, container_count: u64, volume_count: u64) -> Self {
        let root = root.into();
        Self {
            compose_file: root.join(COMPOSE_MARKERS[0]),
            root,
            container_count,
            volume_count,
        }
    }

    /// Walk up from `start` to the first directory holding a compose file.
    pub fn locate(start: &Path) -> Result<Self> {
        debug!(start = %start.display(), "locating environment");
        for dir in start.ancestors() {
            if let Some(compose_file) = find_marker(dir) {
                let env = Self::from_compose_file(dir, &compose_file)?;
                info!(
                    root = %env.root.display(),
                    containers = env.container_count,
                    volumes = env.volume_count,
                    "environment located"
                );
                return Ok(env);
            }
        }
        Err(anyhow!(
            "no environment found: none of {} in {} or its parents",
            COMPOSE_MARKERS.join(", "),
            start.display()
        ))
    }

    fn from_compose_file(root: &Path, compose_file: &Path) -> Result<Self> {
        let contents = fs::read_to_string(compose_file)
            .with_context(|| format!("read {}", compose_file.display()))?;
        let compose: ComposeFile = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse {}", compose_file.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            compose_file: compose_file.to_path_buf(),
            container_count: compose.services.len() as u64,
            volume_count: compose.volumes.map_or(0, |v| v.len() as u64),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn compose_file(&self) -> &Path {
        &self.compose_file
    }

    pub fn container_count(&self) -> u64 {
        self.container_count
    }

    pub fn volume_count(&self) -> u64 {
        self.volume_count
    }
}

fn find_marker(dir: &Path) -> Option<PathBuf> {
    COMPOSE_MARKERS
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPOSE: &str = "\
services:
  nginx:
    image: nginx
  php:
    build: ./php
  mysql:
    image: mysql:5.7
volumes:
  mysql-data:
  sync:
    external: true
";

    #[test]
    fn locate_walks_up_and_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("docker-compose.yml"), COMPOSE).expect("write compose");
        let nested = temp.path().join("src").join("app");
        fs::create_dir_all(&nested).expect("mkdir");

        let env = Environment::locate(&nested).expect("locate");
        assert_eq!(env.root(), temp.path());
        assert_eq!(env.container_count(), 3);
        assert_eq!(env.volume_count(), 2);
    }

    #[test]
    fn missing_volumes_section_counts_zero() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("compose.yaml"),
            "services:\n  web:\n    image: nginx\n",
        )
        .expect("write compose");
        let env = Environment::locate(temp.path()).expect("locate");
        assert_eq!(env.volume_count(), 0);
        assert_eq!(env.compose_file(), temp.path().join("compose.yaml"));
    }

    #[test]
    fn locate_without_marker_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Environment::locate(temp.path()).unwrap_err();
        assert!(err.to_string().contains("no environment found"));
    }

    #[test]
    fn malformed_compose_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("docker-compose.yml"), "services: [").expect("write");
        let err = Environment::locate(temp.path()).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }
}
