//! One-shot commands: run to completion, bounded by a timeout.

use std::process::{Output, Stdio};
use std::time::Duration;

use livekeep_core::CommandLine;
use tokio::process::Command;

use crate::error::ProcError;

fn command(cmd: &CommandLine) -> Command {
    let mut command = Command::new(&cmd.program);
    command.args(&cmd.args).stdin(Stdio::null()).kill_on_drop(true);
    command
}

/// Run with output discarded. `Ok(true)` iff the exit status is 0; a
/// timeout kills the child and counts as a non-zero exit.
pub async fn run_status(cmd: &CommandLine, timeout: Duration) -> Result<bool, ProcError> {
    let mut child = command(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ProcError::spawn(&cmd.program, source))?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => Ok(status?.success()),
        Err(_) => {
            tracing::warn!(cmd = %cmd, timeout_secs = timeout.as_secs(), "command timed out");
            child.kill().await?;
            Ok(false)
        }
    }
}

/// Run and collect stdout and stderr. The child is killed on timeout.
pub async fn run_output(cmd: &CommandLine, timeout: Duration) -> Result<Output, ProcError> {
    let child = command(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcError::spawn(&cmd.program, source))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(ProcError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        assert!(run_status(&sh("exit 0"), Duration::from_secs(5)).await.expect("run"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure() {
        assert!(!run_status(&sh("exit 1"), Duration::from_secs(5)).await.expect("run"));
    }

    #[tokio::test]
    async fn status_timeout_counts_as_failure() {
        let ok = tokio::time::timeout(
            Duration::from_secs(5),
            run_status(&sh("sleep 30"), Duration::from_millis(100)),
        )
        .await
        .expect("timeout must be enforced")
        .expect("run");
        assert!(!ok);
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let err = run_status(&CommandLine::new("/nonexistent/streamlink"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn output_is_collected() {
        let out = run_output(&sh("echo out; echo err >&2; exit 2"), Duration::from_secs(5))
            .await
            .expect("run");
        assert_eq!(out.status.code(), Some(2));
        assert_eq!(String::from_utf8_lossy(&out.stdout), "out\n");
        assert_eq!(String::from_utf8_lossy(&out.stderr), "err\n");
    }

    #[tokio::test]
    async fn output_timeout_is_an_error() {
        let err = run_output(&sh("sleep 30"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcError::Timeout(_)));
        assert!(err.is_transient());
    }
}
