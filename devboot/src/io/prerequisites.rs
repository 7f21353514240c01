//! Checks that the external binaries the bootstrapper drives are on `PATH`.

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prerequisite {
    pub name: &'static str,
    pub binary: &'static str,
    pub mandatory: bool,
    pub installed: bool,
    pub comment: Option<&'static str>,
}

struct Requirement {
    name: &'static str,
    binary: &'static str,
    mandatory: bool,
    comment: Option<&'static str>,
}

const REQUIREMENTS: [Requirement; 6] = [
    Requirement {
        name: "Docker",
        binary: "docker",
        mandatory: true,
        comment: None,
    },
    Requirement {
        name: "Docker-Compose",
        binary: "docker-compose",
        mandatory: true,
        comment: None,
    },
    Requirement {
        name: "MySQL",
        binary: "mysql",
        mandatory: true,
        comment: None,
    },
    Requirement {
        name: "Mutagen",
        binary: "mutagen",
        mandatory: true,
        comment: Some("https://mutagen.io/"),
    },
    Requirement {
        name: "Yarn",
        binary: "yarn",
        mandatory: false,
        comment: None,
    },
    Requirement {
        name: "Magento Cloud CLI",
        binary: "magento-cloud",
        mandatory: false,
        comment: Some("Recommended when working on a Magento Cloud project."),
    },
];

/// Look up every known binary.
pub fn check_prerequisites() -> Vec<Prerequisite> {
    check_with(|binary| which::which(binary).is_ok())
}

fn check_with<F: Fn(&str) -> bool>(is_installed: F) -> Vec<Prerequisite> {
    REQUIREMENTS
        .iter()
        .map(|req| {
            let installed = is_installed(req.binary);
            debug!(binary = req.binary, installed, "prerequisite checked");
            Prerequisite {
                name: req.name,
                binary: req.binary,
                mandatory: req.mandatory,
                installed,
                comment: req.comment,
            }
        })
        .collect()
}

/// Mandatory binaries that are missing.
pub fn missing_mandatory(checks: &[Prerequisite]) -> Vec<&Prerequisite> {
    checks
        .iter()
        .filter(|check| check.mandatory && !check.installed)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_binaries_never_block() {
        let checks = check_with(|binary| binary != "yarn" && binary != "magento-cloud");
        assert!(missing_mandatory(&checks).is_empty());
        assert_eq!(checks.len(), 6);
    }

    #[test]
    fn missing_mandatory_is_reported() {
        let checks = check_with(|binary| binary != "mutagen");
        let missing = missing_mandatory(&checks);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "Mutagen");
        assert_eq!(missing[0].comment, Some("https://mutagen.io/"));
    }
}
