//! Collection orchestrator.
//!
//! Runs every selected extension through scan, span building, probe
//! synthesis, sampling and aggregation, one extension at a time. Failure
//! units are one extension (scan errors) and one probe (build or sampling
//! errors); neither aborts the run.

use std::path::PathBuf;

use crate::config::CollectorConfig;
use crate::error::{FixtureError, ToolError};
use crate::fixture::FixtureScanner;
use crate::probe::{synthesize, Extent, ProbeBuilder, ProbeLayout};
use crate::report::{CollectionReport, DiscardedProbe, SkippedExtension};
use crate::runner::{RawSample, SamplingRunner, SamplingTool};
use crate::span::{Span, SpanBuilder};
use crate::stats::StatsAggregator;

/// Scans one fixture completely into spans.
///
/// # Errors
///
/// Returns the first [`FixtureError`] of the fixture.
pub fn scan_extension(
    path: impl Into<PathBuf>,
    extension: &str,
    span_size: usize,
) -> Result<Vec<Span>, FixtureError> {
    let scanner = FixtureScanner::open(path.into())?;
    SpanBuilder::new(scanner, extension, span_size).collect()
}

/// Drives a collection run with the given collaborators.
pub struct Collector<'a> {
    config: &'a CollectorConfig,
    builder: &'a dyn ProbeBuilder,
    tool: &'a dyn SamplingTool,
}

impl<'a> Collector<'a> {
    /// Creates a collector. The configuration is expected to be validated.
    #[must_use]
    pub fn new(
        config: &'a CollectorConfig,
        builder: &'a dyn ProbeBuilder,
        tool: &'a dyn SamplingTool,
    ) -> Self {
        Self {
            config,
            builder,
            tool,
        }
    }

    /// Evaluates every configured extension and returns the combined report.
    ///
    /// Every probe of a run shares one buffer layout, so a first pass streams
    /// each fixture's spans to size it. The second pass then takes one
    /// extension at a time through scanning, probing, sampling and
    /// aggregation before starting the next.
    #[must_use]
    pub fn collect(&self) -> CollectionReport {
        let mut report = CollectionReport::new();
        let (layout, extensions) = self.plan(&mut report);
        tracing::debug!(?layout, "probe memory layout");

        let runner = SamplingRunner::new(self.tool, &self.config.events, self.config.perf_rounds);
        let mut aggregator = StatsAggregator::new(self.config.reduction);

        for ext in extensions {
            let spans = match scan_extension(
                self.config.fixture_path(ext),
                ext,
                self.config.iform_span_size,
            ) {
                Ok(spans) => spans,
                Err(err) => {
                    skip(&mut report, ext, &err);
                    continue;
                }
            };
            let instructions: usize = spans.iter().map(Span::len).sum();
            tracing::info!(
                extension = %ext,
                spans = spans.len(),
                instructions,
                "collecting counters"
            );
            for span in &spans {
                match self.evaluate(span, &layout, &runner) {
                    Ok(samples) => {
                        aggregator.add_span(span, &samples);
                        report.probes += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            extension = %ext,
                            span = span.ordinal,
                            "discard probe: {err}"
                        );
                        report.discarded.push(DiscardedProbe {
                            extension: ext.to_string(),
                            span: span.ordinal,
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        report.stats = aggregator.finish();
        report
    }

    /// Sizes the buffer over every fixture that scans cleanly and returns
    /// those extensions. The others are recorded as skipped.
    fn plan(&self, report: &mut CollectionReport) -> (ProbeLayout, Vec<&'a str>) {
        let mut extent = Extent::default();
        let mut extensions = Vec::new();
        let config = self.config;
        for ext in &config.extensions {
            let scanned = FixtureScanner::open(config.fixture_path(ext)).and_then(|scanner| {
                for span in SpanBuilder::new(scanner, ext.as_str(), config.iform_span_size) {
                    extent.add(&span?);
                }
                Ok(())
            });
            match scanned {
                Ok(()) => extensions.push(ext.as_str()),
                Err(err) => skip(report, ext, &err),
            }
        }
        (extent.layout(), extensions)
    }

    /// Synthesizes, builds and samples the probe of one span.
    fn evaluate(
        &self,
        span: &Span,
        layout: &ProbeLayout,
        runner: &SamplingRunner<'_>,
    ) -> Result<Vec<RawSample>, ToolError> {
        let source = synthesize(span, self.config.loop_count, layout);
        let files = source.write(&self.config.probe_dir())?;
        let binary = self.builder.build(&files)?;
        tracing::debug!(
            extension = %span.extension,
            span = span.ordinal,
            "built {}",
            binary.display()
        );
        runner.sample(&binary)
    }
}

fn skip(report: &mut CollectionReport, extension: &str, err: &FixtureError) {
    tracing::error!(extension = %extension, "skip {extension}: can't scan test file: {err}");
    report.skipped.push(SkippedExtension {
        extension: extension.to_string(),
        reason: err.to_string(),
    });
}
