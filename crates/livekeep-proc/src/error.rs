//! Error types for the process boundary.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcError {
    #[error("{program} not found in PATH")]
    NotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session log files are already closed")]
    LogsClosed,

    #[error("command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("mux command file {0} is empty or malformed")]
    BadMuxFile(PathBuf),

    #[error("merge command exited with {0}")]
    MergeFailed(ExitStatus),

    #[error("process io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcError {
    pub(crate) fn spawn(program: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                program: program.to_string(),
            }
        } else {
            Self::Spawn {
                program: program.to_string(),
                source,
            }
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Spawn { source, .. } | Self::Io(source) => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}
