//! Collector configuration, fixture discovery and validation.

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::exec;
use crate::runner::TurboEvents;
use crate::stats::Reduction;

/// Extensions evaluated when none are requested.
pub const DEFAULT_EXTENSIONS: [&str; 4] = ["avx512f", "avx512dq", "avx512cd", "avx512bw"];

/// Default scratch directory for probes and results.
pub const DEFAULT_WORK_DIR: &str = "./avx512counters-workdir";

/// Location of the AVX-512 encoder end-to-end tests inside `GOROOT`.
const TESTDATA: [&str; 7] = ["src", "cmd", "asm", "internal", "asm", "testdata", "avx512enc"];

/// Immutable settings for one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Directory holding `<extension>.s` fixtures.
    pub test_dir: PathBuf,
    /// Extensions to evaluate, in order.
    pub extensions: Vec<String>,
    /// Sampling tool binary (`perf`, `ocperf`, ...).
    pub perf_tool: String,
    /// Go tool used to build probes.
    pub go_tool: String,
    /// Absolute scratch directory for probes and results.
    pub work_dir: PathBuf,
    /// Instructions per span.
    pub iform_span_size: usize,
    /// Probe loop iterations.
    pub loop_count: u64,
    /// Sampling rounds per probe.
    pub perf_rounds: u32,
    /// Counters read for turbo levels 0, 1 and 2.
    pub events: TurboEvents,
    /// How samples are combined per instruction form.
    pub reduction: Reduction,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            perf_tool: "perf".to_string(),
            go_tool: "go".to_string(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            iform_span_size: 100,
            loop_count: 1_000_000,
            perf_rounds: 1,
            events: TurboEvents::default(),
            reduction: Reduction::Mean,
        }
    }
}

impl CollectorConfig {
    /// Checks the configuration against the fixtures actually present.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self, available: &BTreeSet<String>) -> Result<(), ConfigError> {
        if let Some(ext) = self.extensions.iter().find(|ext| !available.contains(*ext)) {
            return Err(ConfigError::UnavailableExtension(ext.clone()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.perf_tool.is_empty() {
            return Err(ConfigError::EmptyPerfTool);
        }
        if self.iform_span_size == 0 {
            return Err(ConfigError::ZeroSpanSize);
        }
        if self.loop_count == 0 {
            return Err(ConfigError::ZeroLoopCount);
        }
        if self.perf_rounds == 0 {
            return Err(ConfigError::ZeroPerfRounds);
        }
        Ok(())
    }

    /// Fixture file of `extension`.
    #[must_use]
    pub fn fixture_path(&self, extension: &str) -> PathBuf {
        self.test_dir.join(format!("{extension}.s"))
    }

    /// Directory the current probe is synthesized and built in.
    #[must_use]
    pub fn probe_dir(&self) -> PathBuf {
        self.work_dir.join("probe")
    }

    /// Where the collected statistics are written.
    #[must_use]
    pub fn stats_path(&self) -> PathBuf {
        self.work_dir.join("stats.json")
    }
}

/// Splits a comma-separated extension list, trimming entries and dropping
/// empty ones.
#[must_use]
pub fn parse_extension_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .collect()
}

/// Finds the fixture directory.
///
/// An explicit directory wins; otherwise the AVX-512 encoder tests of the Go
/// installation named by `GOROOT` (or `go env GOROOT`) are used.
///
/// # Errors
///
/// Returns an error if `GOROOT` cannot be determined or the directory does
/// not exist.
pub fn locate_test_dir(explicit: Option<&Path>, go_tool: &str) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => {
            let goroot = goroot(go_tool)?;
            TESTDATA.iter().fold(goroot, |path, part| path.join(part))
        }
    };
    if !dir.is_dir() {
        return Err(ConfigError::MissingTestDir(dir).into());
    }
    Ok(dir)
}

fn goroot(go_tool: &str) -> Result<PathBuf> {
    if let Some(root) = env::var_os("GOROOT").filter(|r| !r.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    let stdout = exec::run(Command::new(go_tool).args(["env", "GOROOT"]), go_tool)
        .context("Failed to query GOROOT")?;
    let root = String::from_utf8_lossy(&stdout).trim().to_string();
    if root.is_empty() {
        anyhow::bail!("{go_tool} env GOROOT printed nothing");
    }
    Ok(PathBuf::from(root))
}

/// Lists the extensions that have a fixture in `test_dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn available_extensions(test_dir: &Path) -> Result<BTreeSet<String>> {
    let mut available = BTreeSet::new();
    for entry in WalkDir::new(test_dir).min_depth(1).max_depth(1) {
        let entry =
            entry.with_context(|| format!("Failed to read {}", test_dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|x| x == "s") {
            if let Some(stem) = path.file_stem() {
                available.insert(stem.to_string_lossy().into_owned());
            }
        }
    }
    Ok(available)
}

/// Creates the work directory if it does not exist yet.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn prepare_work_dir(work_dir: &Path) -> Result<()> {
    fs::create_dir_all(work_dir)
        .with_context(|| format!("Failed to create work directory: {}", work_dir.display()))
}
