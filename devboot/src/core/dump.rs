//! Database dump formats and the stage that turns each into plain SQL on stdout.

use std::path::Path;

use crate::core::pipeline::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Zip,
    Gzip,
    PlainSql,
}

impl DumpFormat {
    /// Select by extension (case-insensitive). Unknown or missing extensions
    /// are read as plain SQL.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("zip") => Self::Zip,
            Some("gz" | "gzip") => Self::Gzip,
            _ => Self::PlainSql,
        }
    }

    pub fn is_compressed(&self) -> bool {
        match self {
            Self::Zip | Self::Gzip => true,
            Self::PlainSql => false,
        }
    }

    /// Only compressed dumps are size-limited; a file of exactly `limit` bytes
    /// is accepted.
    pub fn exceeds_size_limit(&self, size: u64, limit: u64) -> bool {
        self.is_compressed() && size > limit
    }

    /// First pipeline stage: writes the decompressed dump to stdout.
    pub fn source_stage(&self, path: &Path) -> Stage {
        let file = path.to_string_lossy().into_owned();
        match self {
            Self::Zip => Stage::new("unzip", ["-p".to_string(), file]),
            Self::Gzip => Stage::new("gunzip", ["-c".to_string(), file]),
            Self::PlainSql => Stage::new("cat", [file]),
        }
    }

    /// Estimated progress units from the qualifying line count of the decoded
    /// dump. Compressed inputs use a coarser estimate (half).
    pub fn expected_units(&self, qualifying_lines: u64) -> u64 {
        if self.is_compressed() {
            qualifying_lines / 2
        } else {
            qualifying_lines
        }
    }
}
