//! Subprocess execution behind a trait, so ffmpeg and pandoc calls can be tested
//! without either installed.

use crate::error::{PipelineError, Result};
use std::process::Command;

/// Lines of stderr kept in a tool failure message.
const STDERR_TAIL_LINES: usize = 8;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync for use in concurrent contexts.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the stdout of the command on success.
    /// Returns a `ToolInvocation` error if the command is missing or exits non-zero.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        tracing::debug!(command, ?args, "running");
        let output = Command::new(command).args(args).output().map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::NotFound {
                format!("{command} not found on PATH")
            } else {
                format!("failed to execute {command}: {e}")
            };
            PipelineError::ToolInvocation {
                tool: command.to_string(),
                message,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(PipelineError::ToolInvocation {
                tool: command.to_string(),
                message: format!("{}: {}", output.status, failure_detail(&stderr, &stdout)),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Last non-empty lines of `stderr`; ffmpeg prints its banner first.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// stderr tail, else stdout tail, for tools that report errors on stdout.
fn failure_detail(stderr: &str, stdout: &str) -> String {
    [stderr, stdout]
        .into_iter()
        .map(stderr_tail)
        .find(|tail| !tail.is_empty())
        .unwrap_or_else(|| "no diagnostic output".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_command_is_tool_invocation_error() {
        let result = SystemCommandExecutor::new().execute("minutes-no-such-tool-xyz", &[]);
        match result {
            Err(PipelineError::ToolInvocation { tool, message }) => {
                assert_eq!(tool, "minutes-no-such-tool-xyz");
                assert!(message.contains("not found"));
            }
            other => panic!("Expected ToolInvocation error, got {other:?}"),
        }
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 12"));
        assert!(tail.ends_with("line 19"));
    }

    #[test]
    fn test_stderr_tail_skips_blank_lines() {
        assert_eq!(stderr_tail("\n\nerror: bad input\n\n"), "error: bad input");
    }

    #[test]
    fn test_failure_detail_falls_back_to_stdout() {
        assert_eq!(failure_detail("boom\n", "ignored"), "boom");
        assert_eq!(failure_detail("  \n", "pandoc: unknown reader\n"), "pandoc: unknown reader");
        assert_eq!(failure_detail("", ""), "no diagnostic output");
    }

    #[test]
    fn test_executor_is_object_safe() {
        let executor: Box<dyn CommandExecutor> = Box::new(SystemCommandExecutor::new());
        assert!(executor.execute("minutes-no-such-tool-xyz", &["-h"]).is_err());
    }
}
