//! Reduction of raw samples into per-instruction-form statistics.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ConfigError;
use crate::iform::{span_iforms, Iform, IformKey};
use crate::runner::RawSample;
use crate::span::Span;

/// How contributing samples are combined into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Arithmetic mean.
    #[default]
    Mean,
    /// Middle value; mean of the two middle values for even counts.
    Median,
    /// Plain sum.
    Sum,
}

impl Reduction {
    /// Reduces `values`. An empty slice reduces to zero.
    #[must_use]
    pub fn reduce(self, values: &[u64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let total: u128 = values.iter().map(|&v| u128::from(v)).sum();
        match self {
            Self::Sum => total as f64,
            Self::Mean => total as f64 / values.len() as f64,
            Self::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_unstable();
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    sorted[mid] as f64
                } else {
                    (u128::from(sorted[mid - 1]) + u128::from(sorted[mid])) as f64 / 2.0
                }
            }
        }
    }
}

impl FromStr for Reduction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "sum" => Ok(Self::Sum),
            _ => Err(ConfigError::UnknownReduction(s.to_string())),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Sum => "sum",
        })
    }
}

/// Turbo level counters for one instruction form of one extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IformStats {
    /// Extension the instruction belongs to.
    pub ext: String,
    /// Tested instruction form.
    pub iform: Iform,
    /// Reduced turbo level 0 counter.
    pub level0: f64,
    /// Reduced turbo level 1 counter.
    pub level1: f64,
    /// Reduced turbo level 2 counter.
    pub level2: f64,
    /// Number of raw samples that contributed.
    pub samples: usize,
}

/// Accumulates span samples per instruction form.
///
/// Samples are kept until [`finish`](Self::finish) so that within-probe
/// rounds and cross-span merges go through the same reduction.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    reduction: Reduction,
    order: Vec<IformKey>,
    samples: HashMap<IformKey, Vec<RawSample>>,
}

impl StatsAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(reduction: Reduction) -> Self {
        Self {
            reduction,
            ..Self::default()
        }
    }

    /// Attributes a span's per-round samples to every form the span exercises.
    pub fn add_span(&mut self, span: &Span, samples: &[RawSample]) {
        if samples.is_empty() {
            return;
        }
        for iform in span_iforms(span) {
            let key = IformKey {
                extension: span.extension.clone(),
                iform,
            };
            match self.samples.get_mut(&key) {
                Some(existing) => existing.extend_from_slice(samples),
                None => {
                    self.order.push(key.clone());
                    self.samples.insert(key, samples.to_vec());
                }
            }
        }
    }

    /// Number of distinct forms seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Reduces everything into one record per form, in first-seen order.
    #[must_use]
    pub fn finish(mut self) -> Vec<IformStats> {
        let reduction = self.reduction;
        self.order
            .into_iter()
            .map(|key| {
                let samples = self.samples.remove(&key).unwrap_or_default();
                let level = |get: fn(&RawSample) -> u64| {
                    let values: Vec<u64> = samples.iter().map(get).collect();
                    reduction.reduce(&values)
                };
                IformStats {
                    level0: level(|s| s.level0),
                    level1: level(|s| s.level1),
                    level2: level(|s| s.level2),
                    samples: samples.len(),
                    ext: key.extension,
                    iform: key.iform,
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::fixture::InstructionRecord;

    fn sample(level0: u64, level1: u64, level2: u64) -> RawSample {
        RawSample {
            level0,
            level1,
            level2,
        }
    }

    fn span(ext: &str, lines: &[(&str, &[&str])]) -> Span {
        Span {
            extension: ext.to_string(),
            ordinal: 0,
            records: lines
                .iter()
                .map(|(op, args)| InstructionRecord {
                    op: (*op).to_string(),
                    args: args.iter().map(|a| (*a).to_string()).collect(),
                    text: String::new(),
                    line_no: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn reductions() {
        let values = [4, 1, 3, 2];
        assert_eq!(Reduction::Mean.reduce(&values), 2.5);
        assert_eq!(Reduction::Median.reduce(&values), 2.5);
        assert_eq!(Reduction::Median.reduce(&[5, 1, 9]), 5.0);
        assert_eq!(Reduction::Sum.reduce(&values), 10.0);
        assert_eq!(Reduction::Mean.reduce(&[]), 0.0);
    }

    #[test]
    fn reduction_from_str() {
        assert_eq!("Median".parse::<Reduction>().unwrap(), Reduction::Median);
        assert!(matches!(
            "mode".parse::<Reduction>(),
            Err(ConfigError::UnknownReduction(_))
        ));
        assert_eq!(Reduction::default().to_string(), "mean");
    }

    #[test]
    fn merges_forms_across_spans() {
        let mut agg = StatsAggregator::new(Reduction::Mean);
        let a = span(
            "avx512f",
            &[("VADDPD", &["(AX)", "Z1", "Z2"]), ("KANDNW", &["K1", "K2", "K3"])],
        );
        let b = span("avx512f", &[("VADDPD", &["64(BX)", "Z3", "Z4"])]);
        agg.add_span(&a, &[sample(10, 0, 0), sample(20, 2, 0)]);
        agg.add_span(&b, &[sample(30, 4, 6), sample(40, 6, 6)]);
        assert_eq!(agg.len(), 2);

        let stats = agg.finish();
        assert_eq!(stats[0].iform.as_str(), "VADDPD mem, reg, reg");
        assert_eq!(stats[0].level0, 25.0);
        assert_eq!(stats[0].level1, 3.0);
        assert_eq!(stats[0].level2, 3.0);
        assert_eq!(stats[0].samples, 4);
        assert_eq!(stats[1].iform.as_str(), "KANDNW reg, reg, reg");
        assert_eq!(stats[1].level0, 15.0);
        assert_eq!(stats[1].samples, 2);
    }

    #[test]
    fn extensions_are_separate_keys() {
        let mut agg = StatsAggregator::new(Reduction::Sum);
        let line: &[(&str, &[&str])] = &[("VPABSB", &["Z1", "Z2"])];
        agg.add_span(&span("avx512bw", line), &[sample(1, 1, 1)]);
        agg.add_span(&span("avx512f", line), &[sample(2, 2, 2)]);
        let stats = agg.finish();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].ext, "avx512bw");
        assert_eq!(stats[1].ext, "avx512f");
    }

    #[test]
    fn empty_samples_are_ignored() {
        let mut agg = StatsAggregator::default();
        agg.add_span(&span("avx512f", &[("VADDPD", &["Z1", "Z2", "Z3"])]), &[]);
        assert!(agg.is_empty());
    }

    #[test]
    fn serializes_to_json() {
        let mut agg = StatsAggregator::new(Reduction::Mean);
        agg.add_span(
            &span("avx512cd", &[("VPLZCNTD", &["Z1", "Z2"])]),
            &[sample(8, 0, 0)],
        );
        let json = serde_json::to_value(agg.finish()).unwrap();
        assert_eq!(json[0]["ext"], "avx512cd");
        assert_eq!(json[0]["iform"], "VPLZCNTD reg, reg");
        assert_eq!(json[0]["level0"], 8.0);
    }
}
