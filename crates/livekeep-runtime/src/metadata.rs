//! Stream metadata lookup through yt-dlp.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livekeep_core::{CommandBuilder, CoreError, ProxyPool, RetryPolicy, StreamMetadata};
use livekeep_proc::{ProcError, retry, run_output};
use thiserror::Error;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(180);

/// stderr fragments that mark a failure worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "name resolution",
    "temporary failure",
    "timed out",
    "connection reset",
    "connection refused",
    "remote end closed",
    "http error 429",
    "too many requests",
    "http error 500",
    "http error 502",
    "http error 503",
    "http error 504",
];

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Proc(#[from] ProcError),

    #[error("yt-dlp exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("invalid metadata json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unusable metadata: {0}")]
    Metadata(#[from] CoreError),
}

impl ResolveError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Proc(e) => e.is_transient(),
            Self::Failed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m))
            }
            Self::Json(_) | Self::Metadata(_) => false,
        }
    }
}

/// Looks up what is currently streaming at a channel URL.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<StreamMetadata, ResolveError>;
}

pub struct YtDlpResolver {
    commands: CommandBuilder,
    proxies: Arc<ProxyPool>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(commands: CommandBuilder, proxies: Arc<ProxyPool>) -> Self {
        Self {
            commands,
            proxies,
            retry: RetryPolicy::default(),
            timeout: RESOLVE_TIMEOUT,
        }
    }

    async fn attempt(&self, url: &str) -> Result<StreamMetadata, ResolveError> {
        let cmd = self.commands.metadata(url, self.proxies.next());
        let output = run_output(&cmd, self.timeout).await?;
        if !output.status.success() {
            return Err(ResolveError::Failed {
                status: output.status,
                stderr: last_line(&output.stderr),
            });
        }
        let raw: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(StreamMetadata::from_json(raw)?)
    }
}

#[async_trait]
impl MetadataResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<StreamMetadata, ResolveError> {
        retry(&self.retry, ResolveError::is_transient, || self.attempt(url)).await
    }
}

/// Last non-empty stderr line; yt-dlp puts the actual error there.
fn last_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
