//! `avx512counters`: collects turbo license counters for every AVX-512
//! instruction form found in the Go assembler encoder tests.
//!
//! For each requested extension, the encoder test file is cut into spans of
//! `--iformSpanSize` instructions; each span becomes a Go probe that runs
//! `--loopCount` times under `perf stat`, `--perfRounds` times over.
//!
//! **Outputs:**
//! - `<workDir>/stats.json`: one record per (extension, instruction form)
//! - a summary table on standard output
//!
//! **Usage:**
//! ```
//! avx512counters [--extensions avx512f,avx512bw] [--perf ocperf] [--workDir <path>]
//!                [--iformSpanSize 100] [--loopCount 1000000] [--perfRounds 1]
//! ```
//!
//! Exits non-zero if any setup stage fails. Extensions that fail to scan and
//! probes that fail to build or sample are logged and skipped.

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    missing_docs,
    clippy::missing_errors_doc
)]

use std::path::{self, PathBuf};
use std::process;

use anyhow::{Context, Result};
use avx512_counters::config::{
    available_extensions, locate_test_dir, parse_extension_list, prepare_work_dir,
    DEFAULT_WORK_DIR,
};
use avx512_counters::probe::GoBuilder;
use avx512_counters::runner::{PerfTool, TurboEvents};
use avx512_counters::{stage, CollectionReport, Collector, CollectorConfig, Reduction};
use clap::Parser;

/// Collect AVX-512 turbo license counters per instruction form.
#[derive(Parser)]
#[command(
    name = "avx512counters",
    about = "Collect turbo license counters for AVX-512 instruction forms"
)]
struct Args {
    /// Comma-separated list of extensions to be evaluated.
    #[arg(long, default_value = "avx512f,avx512dq,avx512cd,avx512bw")]
    extensions: String,

    /// perf tool binary name. ocperf and other drop-in replacements will do.
    #[arg(long, default_value = "perf")]
    perf: String,

    /// Where to put results and the intermediate files.
    #[arg(long = "workDir", default_value = DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    /// How many instruction lines form a single iform span.
    /// Higher values slow down the collection.
    #[arg(long = "iformSpanSize", default_value_t = 100)]
    iform_span_size: usize,

    /// How many times to execute every iform span.
    /// Higher values slow down the collection.
    #[arg(long = "loopCount", default_value_t = 1_000_000)]
    loop_count: u64,

    /// How many times to re-validate perf results.
    /// Higher values slow down the collection.
    #[arg(long = "perfRounds", default_value_t = 1)]
    perf_rounds: u32,

    /// AVX-512 encoder test directory (default: located through GOROOT).
    #[arg(long = "testDir")]
    test_dir: Option<PathBuf>,

    /// Go tool binary used to build probes.
    #[arg(long, default_value = "go")]
    go: String,

    /// Comma-separated turbo license level 0, 1 and 2 event names.
    #[arg(long, default_value_t = TurboEvents::default())]
    events: TurboEvents,

    /// How samples are combined per instruction form: mean, median or sum.
    #[arg(long, default_value_t = Reduction::Mean)]
    reduction: Reduction,
}

impl Args {
    /// Builds the collector configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the work directory cannot be made absolute.
    fn into_config(self, test_dir: PathBuf) -> Result<CollectorConfig> {
        let work_dir = path::absolute(&self.work_dir)
            .with_context(|| format!("expand -workDir {}", self.work_dir.display()))?;
        Ok(CollectorConfig {
            test_dir,
            extensions: parse_extension_list(&self.extensions),
            perf_tool: self.perf,
            go_tool: self.go,
            work_dir,
            iform_span_size: self.iform_span_size,
            loop_count: self.loop_count,
            perf_rounds: self.perf_rounds,
            events: self.events,
            reduction: self.reduction,
        })
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if let Err(err) = run(args) {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

/// Runs the collector stages in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first failing stage's error, prefixed with the stage name.
fn run(args: Args) -> Result<()> {
    let test_dir = stage("locate test dir", || {
        locate_test_dir(args.test_dir.as_deref(), &args.go)
    })?;
    let available = stage("read extensions", || available_extensions(&test_dir))?;
    let config = stage("parse command-line args", || args.into_config(test_dir))?;
    stage("validate command-line args", || Ok(config.validate(&available)?))?;
    stage("prepare work dir", || prepare_work_dir(&config.work_dir))?;

    let builder = GoBuilder {
        go: config.go_tool.clone(),
    };
    let perf = PerfTool {
        binary: config.perf_tool.clone(),
    };
    let report = stage("collect counters", || {
        Ok(Collector::new(&config, &builder, &perf).collect())
    })?;

    let stats_path = config.stats_path();
    stage("write results", || report.write_stats(&stats_path))?;

    print_summary(&report, &config);
    println!("  Written: {}", stats_path.display());
    Ok(())
}

fn print_summary(report: &CollectionReport, config: &CollectorConfig) {
    println!("AVX-512 Turbo License Counters ({})", config.reduction);
    println!("==============================");
    println!();

    let width = report
        .stats
        .iter()
        .map(|s| s.iform.as_str().len())
        .max()
        .unwrap_or(0)
        .max(5);
    println!(
        "{:<10} {:<width$} {:>14} {:>14} {:>14}",
        "ext", "iform", "level0", "level1", "level2"
    );
    for s in &report.stats {
        println!(
            "{:<10} {:<width$} {:>14.1} {:>14.1} {:>14.1}",
            s.ext,
            s.iform.as_str(),
            s.level0,
            s.level1,
            s.level2
        );
    }

    for skipped in &report.skipped {
        println!("[SKIP] {}: {}", skipped.extension, skipped.reason);
    }
    for discarded in &report.discarded {
        println!(
            "[DISCARD] {} span {}: {}",
            discarded.extension, discarded.span, discarded.reason
        );
    }

    println!();
    println!(
        "Summary: {} instruction forms, {} probes sampled, {} discarded, {} extension(s) skipped",
        report.stats.len(),
        report.probes,
        report.discarded.len(),
        report.skipped.len()
    );
}
