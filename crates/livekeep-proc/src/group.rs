//! The media recorder and chat recorder of one capture session, plus the
//! log files their output goes to.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use livekeep_core::CommandLine;

use crate::error::ProcError;
use crate::handle::ProcessHandle;

/// Everything needed to start one session's processes.
#[derive(Debug, Clone, Copy)]
pub struct GroupSpec<'a> {
    pub media: &'a CommandLine,
    pub chat: &'a CommandLine,
    /// Working directory for both processes.
    pub cwd: &'a Path,
    /// Receives media recorder stdout/stderr. Opened in append mode.
    pub media_log: &'a Path,
    /// Receives chat recorder stdout/stderr. Truncated on open.
    pub chat_log: &'a Path,
    pub kill_grace: Option<Duration>,
}

/// Exactly one media process and one chat process, started together.
///
/// Log files are closed exactly once, either by [`close`](Self::close) or
/// on drop. Dropping the group kills any process still running.
pub struct CaptureProcessGroup {
    media: ProcessHandle,
    chat: ProcessHandle,
    media_log: Option<File>,
    chat_log: Option<File>,
}

impl CaptureProcessGroup {
    /// Open both log files and spawn both processes. If the chat recorder
    /// fails to start, the media recorder is killed before returning.
    pub fn start(spec: &GroupSpec<'_>) -> Result<Self, ProcError> {
        let media_log = open_log(spec.media_log, true)?;
        let chat_log = open_log(spec.chat_log, false)?;

        let mut media = ProcessHandle::spawn(
            "media",
            spec.media,
            Some(spec.cwd),
            stdio(&media_log)?,
            stdio(&media_log)?,
        )?;
        let chat = match ProcessHandle::spawn(
            "chat",
            spec.chat,
            Some(spec.cwd),
            stdio(&chat_log)?,
            stdio(&chat_log)?,
        ) {
            Ok(chat) => chat,
            Err(e) => {
                media.kill_now();
                return Err(e);
            }
        };

        let (media, chat) = match spec.kill_grace {
            Some(grace) => (media.with_kill_grace(grace), chat.with_kill_grace(grace)),
            None => (media, chat),
        };

        Ok(Self {
            media,
            chat,
            media_log: Some(media_log),
            chat_log: Some(chat_log),
        })
    }

    pub fn is_media_alive(&mut self) -> bool {
        self.media.is_alive()
    }

    pub fn is_chat_alive(&mut self) -> bool {
        self.chat.is_alive()
    }

    pub async fn terminate_media(&mut self, graceful: bool) -> Result<Option<ExitStatus>, ProcError> {
        self.media.terminate(graceful).await
    }

    pub async fn terminate_chat(&mut self, graceful: bool) -> Result<Option<ExitStatus>, ProcError> {
        self.chat.terminate(graceful).await
    }

    pub fn media_status(&self) -> Option<ExitStatus> {
        self.media.exit_status()
    }

    /// A fresh handle on the media log, for tools that run after the
    /// recorder (the merge step writes here).
    pub fn media_log_stdio(&self) -> Result<Stdio, ProcError> {
        match &self.media_log {
            Some(file) => stdio(file),
            None => Err(ProcError::LogsClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.media_log.is_none() && self.chat_log.is_none()
    }

    /// Flush and close both log files. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), ProcError> {
        let mut first_err = None;
        for file in [self.media_log.take(), self.chat_log.take()].into_iter().flatten() {
            if let Err(e) = file.sync_all() {
                tracing::debug!("log sync failed: {e}");
                first_err.get_or_insert(ProcError::Io(e));
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for CaptureProcessGroup {
    fn drop(&mut self) {
        self.media_log.take();
        self.chat_log.take();
    }
}

fn open_log(path: &Path, append: bool) -> Result<File, ProcError> {
    let mut opts = OpenOptions::new();
    opts.create(true);
    if append {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    opts.open(path).map_err(|source| ProcError::Log {
        path: path.to_path_buf(),
        source,
    })
}

fn stdio(file: &File) -> Result<Stdio, ProcError> {
    Ok(Stdio::from(file.try_clone()?))
}
