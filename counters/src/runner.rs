//! Sampling runner: drives the external counter-sampling tool over a built
//! probe and parses its reports.

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ConfigError, ToolError};
use crate::exec;

/// Default turbo license events (Intel `core_power` PMU).
pub const DEFAULT_EVENTS: [&str; 3] = [
    "core_power.lvl0_turbo_license",
    "core_power.lvl1_turbo_license",
    "core_power.lvl2_turbo_license",
];

/// The three turbo level counter readings of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RawSample {
    /// Cycles at turbo license level 0.
    pub level0: u64,
    /// Cycles at turbo license level 1.
    pub level1: u64,
    /// Cycles at turbo license level 2.
    pub level2: u64,
}

/// Names of the counters read for level 0, 1 and 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurboEvents(pub [String; 3]);

impl TurboEvents {
    /// Comma-separated list, as passed to `perf stat -e`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl Default for TurboEvents {
    fn default() -> Self {
        Self(DEFAULT_EVENTS.map(str::to_string))
    }
}

impl FromStr for TurboEvents {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        let count = names.len();
        let names: [String; 3] = names
            .try_into()
            .map_err(|_| ConfigError::EventCount(count))?;
        Ok(Self(names))
    }
}

impl fmt::Display for TurboEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// An external counter-sampling tool.
pub trait SamplingTool {
    /// Tool name for diagnostics.
    fn name(&self) -> &str;

    /// Runs `probe` once under the tool, counting `events`, and returns the
    /// textual report.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] if the tool cannot be run or fails.
    fn report(&self, probe: &Path, events: &TurboEvents) -> Result<String, ToolError>;
}

/// `perf stat` (or a drop-in replacement such as `ocperf`).
#[derive(Debug, Clone)]
pub struct PerfTool {
    /// Tool binary name or path.
    pub binary: String,
}

impl SamplingTool for PerfTool {
    fn name(&self) -> &str {
        &self.binary
    }

    fn report(&self, probe: &Path, events: &TurboEvents) -> Result<String, ToolError> {
        let mut command = Command::new(&self.binary);
        command
            .args(["stat", "--log-fd", "1", "-x", ",", "-e"])
            .arg(events.joined())
            .arg("--");
        // Relative to the probe directory once the command runs inside it.
        match (probe.parent().filter(|dir| !dir.as_os_str().is_empty()), probe.file_name()) {
            (Some(dir), Some(name)) => {
                command.arg(Path::new(".").join(name)).current_dir(dir);
            }
            _ => {
                command.arg(probe);
            }
        }
        let stdout = exec::run(&mut command, &self.binary)?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

/// Parses a `perf stat -x ,` CSV report.
///
/// Each counter line is `value,unit,event[,...]`. Blank and `#` lines are
/// ignored. Event names match with any `:modifier` suffix removed.
///
/// # Errors
///
/// Returns [`ToolError::MalformedReport`] if an event is missing or its value
/// is not a number (e.g. `<not counted>`).
pub fn parse_report(report: &str, events: &TurboEvents, tool: &str) -> Result<RawSample, ToolError> {
    let malformed = |reason: String| ToolError::MalformedReport {
        tool: tool.to_string(),
        reason,
    };

    let mut values: [Option<u64>; 3] = [None; 3];
    for line in report.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split(',');
        let (Some(value), Some(_unit), Some(event)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let event = event.split(':').next().unwrap_or(event).trim();
        let Some(slot) = events.0.iter().position(|e| e == event) else {
            continue;
        };
        let value = value
            .trim()
            .parse::<u64>()
            .map_err(|_| malformed(format!("{event}: unexpected value {value:?}")))?;
        values[slot] = Some(value);
    }

    match values {
        [Some(level0), Some(level1), Some(level2)] => Ok(RawSample {
            level0,
            level1,
            level2,
        }),
        _ => {
            let missing: Vec<&str> = values
                .iter()
                .zip(&events.0)
                .filter(|(v, _)| v.is_none())
                .map(|(_, e)| e.as_str())
                .collect();
            Err(malformed(format!("missing {}", missing.join(", "))))
        }
    }
}

/// Runs a probe under a [`SamplingTool`] for a fixed number of rounds.
pub struct SamplingRunner<'a> {
    tool: &'a dyn SamplingTool,
    events: &'a TurboEvents,
    rounds: u32,
}

impl<'a> SamplingRunner<'a> {
    /// Creates a runner doing `rounds` rounds per probe.
    #[must_use]
    pub fn new(tool: &'a dyn SamplingTool, events: &'a TurboEvents, rounds: u32) -> Self {
        Self {
            tool,
            events,
            rounds,
        }
    }

    /// Samples `probe` once per round, in order.
    ///
    /// Stops at the first failed round; the caller discards the probe.
    ///
    /// # Errors
    ///
    /// Returns the [`ToolError`] of the first failing round.
    pub fn sample(&self, probe: &Path) -> Result<Vec<RawSample>, ToolError> {
        let mut samples = Vec::with_capacity(self.rounds as usize);
        for round in 0..self.rounds {
            let report = self.tool.report(probe, self.events)?;
            let sample = parse_report(&report, self.events, self.tool.name())?;
            tracing::debug!(round, ?sample, "sampled {}", probe.display());
            samples.push(sample);
        }
        Ok(samples)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const REPORT: &str = "\
# started on Mon Oct  1 10:00:00 2018

1204331,,core_power.lvl0_turbo_license,2000123,100.00,,
88,,core_power.lvl1_turbo_license:u,2000123,100.00,,
0,,core_power.lvl2_turbo_license,2000123,100.00,,
";

    #[test]
    fn parses_csv_report() {
        let sample = parse_report(REPORT, &TurboEvents::default(), "perf").unwrap();
        assert_eq!(
            sample,
            RawSample {
                level0: 1204331,
                level1: 88,
                level2: 0
            }
        );
    }

    #[test]
    fn not_counted_is_malformed() {
        let report = REPORT.replace("88,", "<not counted>,");
        let err = parse_report(&report, &TurboEvents::default(), "perf").unwrap_err();
        assert!(matches!(err, ToolError::MalformedReport { .. }));
        assert!(err.to_string().contains("lvl1"), "{err}");
    }

    #[test]
    fn missing_event_is_malformed() {
        let report: String = REPORT
            .lines()
            .filter(|l| !l.contains("lvl2"))
            .map(|l| format!("{l}\n"))
            .collect();
        let err = parse_report(&report, &TurboEvents::default(), "perf").unwrap_err();
        assert!(err.to_string().contains("missing core_power.lvl2_turbo_license"), "{err}");
    }

    #[test]
    fn events_from_str() {
        let events: TurboEvents = "a, b ,c".parse().unwrap();
        assert_eq!(events.joined(), "a,b,c");
        assert!(matches!(
            "a,b".parse::<TurboEvents>(),
            Err(ConfigError::EventCount(2))
        ));
    }

    struct Scripted {
        calls: Cell<u32>,
        fail_on: Option<u32>,
    }

    impl SamplingTool for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn report(&self, _probe: &Path, _events: &TurboEvents) -> Result<String, ToolError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if self.fail_on == Some(call) {
                return Err(ToolError::MalformedReport {
                    tool: "scripted".to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(format!(
                "{call},,core_power.lvl0_turbo_license\n\
                 1,,core_power.lvl1_turbo_license\n\
                 2,,core_power.lvl2_turbo_license\n"
            ))
        }
    }

    #[test]
    fn runs_every_round_in_order() {
        let tool = Scripted {
            calls: Cell::new(0),
            fail_on: None,
        };
        let events = TurboEvents::default();
        let samples = SamplingRunner::new(&tool, &events, 3)
            .sample(Path::new("probe"))
            .unwrap();
        let level0: Vec<u64> = samples.iter().map(|s| s.level0).collect();
        assert_eq!(level0, vec![0, 1, 2]);
        assert_eq!(tool.calls.get(), 3);
    }

    #[test]
    fn failed_round_stops_sampling() {
        let tool = Scripted {
            calls: Cell::new(0),
            fail_on: Some(1),
        };
        let events = TurboEvents::default();
        let result = SamplingRunner::new(&tool, &events, 4).sample(Path::new("probe"));
        assert!(result.is_err());
        assert_eq!(tool.calls.get(), 2);
    }
}
