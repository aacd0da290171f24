//! AVX-512 turbo license counters per instruction form.
//!
//! Synthesizes micro-benchmarks from the Go assembler's AVX-512 encoder
//! end-to-end tests (`src/cmd/asm/internal/asm/testdata/avx512enc/*.s`), runs
//! them under `perf stat` and reports the turbo license level counters of
//! every instruction form.
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Fixture file → instruction records | [`fixture`] |
//! | Operand → addressing class | [`operand`] |
//! | Records → fixed-size spans | [`span`] |
//! | Span → Go probe program | [`probe`] |
//! | Probe → raw counter samples | [`runner`] |
//! | Samples → per-form statistics | [`iform`], [`stats`] |
//! | Everything above, per extension | [`collector`] |
//!
//! # Entry Point
//!
//! ```no_run
//! use avx512_counters::collector::Collector;
//! use avx512_counters::config::CollectorConfig;
//! use avx512_counters::probe::GoBuilder;
//! use avx512_counters::runner::PerfTool;
//! use std::path::PathBuf;
//!
//! let config = CollectorConfig {
//!     test_dir: PathBuf::from("/usr/lib/go/src/cmd/asm/internal/asm/testdata/avx512enc"),
//!     ..CollectorConfig::default()
//! };
//! let builder = GoBuilder { go: config.go_tool.clone() };
//! let perf = PerfTool { binary: config.perf_tool.clone() };
//! let report = Collector::new(&config, &builder, &perf).collect();
//! for stats in &report.stats {
//!     println!("{} {}: {}", stats.ext, stats.iform, stats.level0);
//! }
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

pub mod collector;
pub mod config;
pub mod error;
mod exec;
pub mod fixture;
pub mod iform;
pub mod operand;
pub mod probe;
pub mod report;
pub mod runner;
pub mod span;
pub mod stats;

pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{ConfigError, FixtureError, ToolError};
pub use report::CollectionReport;
pub use stats::{IformStats, Reduction};

use anyhow::{Context, Result};

/// Runs one named stage of the collector, tagging any error with its name.
///
/// Callers chain stages with `?`, so the first failing stage ends the run.
///
/// # Errors
///
/// Returns the stage's own error, with the stage name as context.
pub fn stage<T>(name: &'static str, run: impl FnOnce() -> Result<T>) -> Result<T> {
    tracing::info!(stage = name, "starting");
    run().context(name)
}
