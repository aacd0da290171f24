//! Error taxonomy for the collector.
//!
//! Each error type is scoped to the unit of work it aborts:
//! [`ConfigError`] stops the whole run, [`FixtureError`] skips one extension,
//! [`ToolError`] discards one probe.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Invalid command-line configuration. Reported before any probing begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The fixture directory does not exist.
    #[error("can't locate AVX-512 testdata: {} doesn't exist", .0.display())]
    MissingTestDir(PathBuf),
    /// A requested extension has no `<ext>.s` fixture.
    #[error("unavailable extension: {0:?}")]
    UnavailableExtension(String),
    /// The extension list is empty.
    #[error("expected at least 1 extension name")]
    NoExtensions,
    /// `perf` was given as an empty string.
    #[error("argument -perf can't be empty")]
    EmptyPerfTool,
    /// `iformSpanSize` was zero.
    #[error("argument -iformSpanSize can't be 0")]
    ZeroSpanSize,
    /// `loopCount` was zero.
    #[error("argument -loopCount can't be 0")]
    ZeroLoopCount,
    /// `perfRounds` was zero.
    #[error("argument -perfRounds can't be 0")]
    ZeroPerfRounds,
    /// `events` did not name exactly three counters.
    #[error("expected 3 comma-separated turbo level events, got {0}")]
    EventCount(usize),
    /// `reduction` named an unknown policy.
    #[error("unknown reduction {0:?} (expected mean, median or sum)")]
    UnknownReduction(String),
}

/// Malformed or unreadable fixture file.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The fixture file could not be read.
    #[error("{}: {source}", path.display())]
    Read {
        /// Fixture path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// A line did not match the instruction line grammar.
    #[error("{}:{line_no}: unexpected {line:?} line (does not match pattern)", path.display())]
    Parse {
        /// Fixture path.
        path: PathBuf,
        /// 1-based line number.
        line_no: usize,
        /// Offending line text.
        line: String,
    },
    /// The fixture ended before the `RET` sentinel.
    #[error("{}: unexpected EOF (expected RET instruction)", path.display())]
    UnexpectedEof {
        /// Fixture path.
        path: PathBuf,
    },
}

/// Failure of an external collaborator (probe build or sampling tool).
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary could not be started (usually: not found).
    #[error("can't run {tool}: {source}")]
    Spawn {
        /// Tool binary name or path.
        tool: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The tool exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        /// Tool binary name or path.
        tool: String,
        /// Exit status.
        status: ExitStatus,
        /// Tail of standard error output.
        stderr: String,
    },
    /// The tool's report did not follow the expected grammar.
    #[error("malformed {tool} report: {reason}")]
    MalformedReport {
        /// Tool binary name or path.
        tool: String,
        /// What was wrong.
        reason: String,
    },
    /// Writing a probe artifact failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Keeps at most the last `max` characters of tool output for error messages.
pub(crate) fn output_tail(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let count = text.chars().count();
    if count <= max {
        text.to_string()
    } else {
        text.chars().skip(count - max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_short_output() {
        assert_eq!(output_tail(b"  oops\n", 100), "oops");
    }

    #[test]
    fn tail_truncates_from_front() {
        assert_eq!(output_tail(b"abcdef", 3), "def");
    }

    #[test]
    fn parse_error_names_file_and_line() {
        let err = FixtureError::Parse {
            path: PathBuf::from("avx512f.s"),
            line_no: 7,
            line: "\tbogus".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("avx512f.s:7"), "{msg}");
        assert!(msg.contains("bogus"), "{msg}");
    }
}
