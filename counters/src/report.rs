//! Collection report: statistics plus everything that was skipped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::stats::IformStats;

/// An extension that contributed nothing because its fixture failed to scan.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedExtension {
    /// Extension name.
    pub extension: String,
    /// Scan error message.
    pub reason: String,
}

/// A span whose probe failed to build or sample.
#[derive(Debug, Clone, Serialize)]
pub struct DiscardedProbe {
    /// Extension name.
    pub extension: String,
    /// Span ordinal within the extension.
    pub span: usize,
    /// Build or sampling error message.
    pub reason: String,
}

/// Result of one collection run.
#[derive(Debug, Default, Serialize)]
pub struct CollectionReport {
    /// One record per (extension, instruction form).
    pub stats: Vec<IformStats>,
    /// Extensions skipped entirely.
    pub skipped: Vec<SkippedExtension>,
    /// Probes whose samples were discarded.
    pub discarded: Vec<DiscardedProbe>,
    /// Number of probes sampled successfully.
    pub probes: usize,
}

impl CollectionReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every extension was scanned and every probe sampled.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.skipped.is_empty() && self.discarded.is_empty()
    }

    /// Writes the statistics list as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_stats(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.stats)
            .context("Failed to serialize statistics")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_complete() {
        let report = CollectionReport::new();
        assert!(report.complete());
        assert!(report.stats.is_empty());
    }

    #[test]
    fn skips_make_report_incomplete() {
        let mut report = CollectionReport::new();
        report.discarded.push(DiscardedProbe {
            extension: "avx512f".to_string(),
            span: 3,
            reason: "perf exited with exit status: 1".to_string(),
        });
        assert!(!report.complete());
    }

    #[test]
    fn writes_stats_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        CollectionReport::new().write_stats(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }
}
