//! Blocking subprocess execution shared by the probe builder and the
//! sampling tool.

use std::process::Command;

use crate::error::{output_tail, ToolError};

/// How much of a failing tool's stderr is kept in the error.
const STDERR_TAIL: usize = 2000;

/// Runs `command` to completion and returns its standard output.
///
/// # Errors
///
/// Returns [`ToolError::Spawn`] if the program cannot be started and
/// [`ToolError::Failed`] if it exits unsuccessfully.
pub(crate) fn run(command: &mut Command, tool: &str) -> Result<Vec<u8>, ToolError> {
    tracing::debug!(?command, "running {tool}");
    let output = command.output().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: output_tail(&output.stderr, STDERR_TAIL),
        });
    }
    Ok(output.stdout)
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_spawn_error() {
        let err = run(&mut Command::new("/nonexistent/tool"), "tool").unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn failing_command_keeps_stderr() {
        let err = run(
            Command::new("sh").args(["-c", "echo broken >&2; exit 3"]),
            "sh",
        )
        .unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn captures_stdout() {
        let out = run(Command::new("sh").args(["-c", "printf ok"]), "sh").unwrap();
        assert_eq!(out, b"ok");
    }
}
