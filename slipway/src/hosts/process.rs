//! Subprocess plumbing shared by the command-backed collaborators.
//!
//! Every external tool invocation goes through [`run_command`], which
//! captures output, enforces a timeout, and reports failures with enough
//! context for the caller to classify them.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// Captured output of a completed subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status code reported by the operating system.
    pub status_code: i32,
    /// Standard output, lossily decoded as UTF-8.
    pub stdout: String,
    /// Standard error, lossily decoded as UTF-8.
    pub stderr: String,
}

/// Failure modes of a subprocess invocation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The process could not be started at all.
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// Operating system error message.
        message: String,
    },

    /// The process ran past its time limit and was killed.
    #[error("'{command}' timed out after {timeout_secs}s")]
    Timeout {
        /// The command line that timed out.
        command: String,
        /// The limit that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// The process exited with a non-zero status.
    #[error("'{command}' exited with status {status}")]
    Exit {
        /// The command line that failed.
        command: String,
        /// Exit status code.
        status: i32,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
}

impl CommandError {
    /// Returns the captured standard error for exit failures, empty otherwise.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Exit { stderr, .. } => stderr,
            Self::Spawn { .. } | Self::Timeout { .. } => "",
        }
    }
}

/// Substitutes `{name}` placeholders in an argv template.
///
/// Each template element is scanned for every `(name, value)` pair and the
/// placeholder is replaced wherever it occurs. Unknown placeholders are left
/// in place so misconfigured templates fail visibly downstream.
#[must_use]
pub fn render_argv(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut rendered = arg.clone();
            for (name, value) in vars {
                let placeholder = format!("{{{name}}}");
                if rendered.contains(&placeholder) {
                    rendered = rendered.replace(&placeholder, value);
                }
            }
            rendered
        })
        .collect()
}

/// Joins an argv into a single display string for logs and errors.
#[must_use]
pub fn command_line(argv: &[String]) -> String {
    argv.join(" ")
}

/// Runs a command to completion, capturing output and enforcing a time limit.
///
/// Standard input is closed. A non-zero exit status is reported as
/// [`CommandError::Exit`] with both output streams attached so callers can
/// inspect stderr when classifying the failure.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned, exceeds `limit`, or
/// exits with a non-zero status.
pub async fn run_command(
    argv: &[String],
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<CommandOutput, CommandError> {
    let command = command_line(argv);
    let Some((program, args)) = argv.split_first() else {
        return Err(CommandError::Spawn {
            command,
            message: "empty command line".to_string(),
        });
    };

    tracing::debug!(command = %command, cwd = ?cwd, "running command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let status = output.status.code().unwrap_or(-1);

            if output.status.success() {
                Ok(CommandOutput {
                    status_code: status,
                    stdout,
                    stderr,
                })
            } else {
                tracing::debug!(
                    command = %command,
                    status,
                    stderr = %stderr.trim(),
                    "command failed"
                );
                Err(CommandError::Exit {
                    command,
                    status,
                    stdout,
                    stderr,
                })
            }
        }
        Ok(Err(e)) => Err(CommandError::Spawn {
            command,
            message: e.to_string(),
        }),
        Err(_) => Err(CommandError::Timeout {
            command,
            timeout_secs: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_render_argv_substitutes_placeholders() {
        let template = argv(&["pip", "install", "-r", "{manifest}"]);
        let rendered = render_argv(&template, &[("manifest", "requirements.txt")]);
        assert_eq!(rendered, argv(&["pip", "install", "-r", "requirements.txt"]));
    }

    #[test]
    fn test_render_argv_leaves_unknown_placeholders() {
        let template = argv(&["tool", "{unknown}"]);
        let rendered = render_argv(&template, &[("manifest", "x")]);
        assert_eq!(rendered[1], "{unknown}");
    }

    #[test]
    fn test_render_argv_replaces_repeated_occurrences() {
        let template = argv(&["echo", "{v}-{v}"]);
        let rendered = render_argv(&template, &[("v", "1")]);
        assert_eq!(rendered[1], "1-1");
    }

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let output = run_command(&argv(&["echo", "hello"]), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.status_code, 0);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_reports_nonzero_exit() {
        let err = run_command(&argv(&["false"]), None, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            CommandError::Exit { status, .. } => assert_eq!(status, 1),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let err = run_command(&argv(&["sleep", "5"]), None, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_command_reports_spawn_failure() {
        let err = run_command(
            &argv(&["definitely-not-a-real-binary-xyz"]),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_command_rejects_empty_argv() {
        let err = run_command(&[], None, Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            CommandError::Spawn { message, .. } => {
                assert!(message.contains("empty"));
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_command_honors_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), b"x").unwrap();

        let output = run_command(&argv(&["ls"]), Some(dir.path()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }
}
