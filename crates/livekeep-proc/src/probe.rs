//! Point-in-time liveness checks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livekeep_core::{CommandBuilder, ProxyPool, RetryPolicy};

use crate::error::ProcError;
use crate::retry::retry;
use crate::run::run_status;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Answers "is this channel broadcasting right now?".
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_live(&self, url: &str) -> bool;
}

/// Asks streamlink whether it can find a playable stream at the URL.
/// Exit status 0 means live.
pub struct StreamlinkProbe {
    builder: CommandBuilder,
    proxies: Arc<ProxyPool>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StreamlinkProbe {
    pub fn new(builder: CommandBuilder, proxies: Arc<ProxyPool>) -> Self {
        Self {
            builder,
            proxies,
            timeout: DEFAULT_PROBE_TIMEOUT,
            retry: RetryPolicy::none(),
        }
    }

    /// `Ok(exit == 0)`, or `Err` when the probe itself could not run.
    async fn check(&self, url: &str) -> Result<bool, ProcError> {
        let cmd = self.builder.probe(url, self.proxies.next());
        run_status(&cmd, self.timeout).await
    }
}

#[async_trait]
impl LivenessProbe for StreamlinkProbe {
    async fn is_live(&self, url: &str) -> bool {
        match retry(&self.retry, ProcError::is_transient, || self.check(url)).await {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(url, "liveness probe failed: {e}");
                false
            }
        }
    }
}
