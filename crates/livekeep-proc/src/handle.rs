//! Owned handle to one external process.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use livekeep_core::CommandLine;
use tokio::process::{Child, Command};

use crate::error::ProcError;

/// How long a process gets to exit after SIGTERM before it is killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);

/// A spawned child process with a recorded exit status.
///
/// The child is `kill_on_drop`, so dropping a handle whose process is still
/// running kills it.
pub struct ProcessHandle {
    label: &'static str,
    program: String,
    child: Child,
    status: Option<ExitStatus>,
    kill_grace: Duration,
}

impl ProcessHandle {
    pub fn spawn(
        label: &'static str,
        cmd: &CommandLine,
        cwd: Option<&Path>,
        stdout: Stdio,
        stderr: Stdio,
    ) -> Result<Self, ProcError> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|source| ProcError::spawn(&cmd.program, source))?;
        tracing::debug!(label, pid = ?child.id(), cmd = %cmd, "spawned process");

        Ok(Self {
            label,
            program: cmd.program.clone(),
            child,
            status: None,
            kill_grace: DEFAULT_KILL_GRACE,
        })
    }

    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// OS process id, `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// True until the process has exited. An exited process is reaped here,
    /// so a zombie never reads as alive.
    pub fn is_alive(&mut self) -> bool {
        if self.status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.status = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(label = self.label, program = %self.program, "try_wait failed: {e}");
                false
            }
        }
    }

    /// Wait for natural exit and reap.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        Ok(status)
    }

    /// Stop the process. Graceful waits for it to exit on its own; forced
    /// sends SIGTERM, then SIGKILL after the grace period. A no-op on a
    /// process that has already exited.
    pub async fn terminate(&mut self, graceful: bool) -> Result<Option<ExitStatus>, ProcError> {
        if !self.is_alive() {
            return Ok(self.status);
        }
        if graceful {
            return self.wait().await.map(Some);
        }

        self.send_sigterm();
        let status = match tokio::time::timeout(self.kill_grace, self.child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    label = self.label,
                    program = %self.program,
                    grace_secs = self.kill_grace.as_secs(),
                    "process ignored SIGTERM, killing"
                );
                self.child.kill().await?;
                self.child.wait().await?
            }
        };
        self.status = Some(status);
        Ok(Some(status))
    }

    fn send_sigterm(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: kill(2) with a pid we own; no memory is touched.
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                if rc == 0 {
                    return;
                }
            }
        }
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(label = self.label, "start_kill failed: {e}");
        }
    }

    /// Kill immediately without waiting. Used when a half-started group is
    /// abandoned.
    pub(crate) fn kill_now(&mut self) {
        if self.is_alive() {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(label = self.label, "start_kill failed: {e}");
            }
        }
    }
}
