//! The watch loop: resolve channel lists, probe, dispatch capture tasks,
//! and drain them on shutdown.

use std::sync::Arc;
use std::time::Duration;

use livekeep_core::ChannelDescriptor;
use livekeep_proc::LivenessProbe;
use livekeep_source::ChannelSource;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;

use crate::task::{CaptureTask, TaskEnv, TaskOutcome, TaskReport};

const PAUSE_STEP: Duration = Duration::from_secs(1);
const DRAIN_REPORT_EVERY: Duration = Duration::from_secs(5);

/// What one pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub channels: usize,
    pub probed: usize,
    pub live: usize,
    pub dispatched: usize,
    pub health_failures: usize,
    /// The channel lists changed mid-pass and the rest was skipped.
    pub abandoned: bool,
}

pub struct Supervisor {
    source: ChannelSource,
    probe: Arc<dyn LivenessProbe>,
    env: Arc<TaskEnv>,
    tracker: TaskTracker,
    delay: Duration,
    pause_step: Duration,
    probe_concurrency: usize,
}

impl Supervisor {
    pub fn new(
        source: ChannelSource,
        probe: Arc<dyn LivenessProbe>,
        env: Arc<TaskEnv>,
        delay: Duration,
        probe_concurrency: usize,
    ) -> Self {
        Self {
            source,
            probe,
            env,
            tracker: TaskTracker::new(),
            delay,
            pause_step: PAUSE_STEP,
            probe_concurrency: probe_concurrency.max(1),
        }
    }

    #[must_use]
    pub fn with_pause_step(mut self, step: Duration) -> Self {
        self.pause_step = step;
        self
    }

    /// Capture tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Run passes until the shutdown token fires, then drain.
    pub async fn run(mut self) {
        let shutdown = self.env.shutdown.clone();
        loop {
            let summary = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                summary = self.pass() => summary,
            };
            tracing::trace!(?summary, active = self.env.sessions.len(), "pass finished");
            self.pause().await;
            if shutdown.is_cancelled() {
                break;
            }
        }
        self.drain().await;
    }

    /// One pass over the channel lists.
    pub async fn pass(&mut self) -> PassSummary {
        let mut summary = PassSummary::default();
        let resolved = match self.source.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!("{e}");
                return summary;
            }
        };
        summary.channels = resolved.channels.len();
        if resolved.changed {
            tracing::info!(channels = summary.channels, "channel lists loaded");
        }

        let (health, capture): (Vec<_>, Vec<_>) =
            resolved.channels.into_iter().partition(|c| c.health_check);
        let candidates: Vec<_> = capture
            .into_iter()
            .filter(|c| !self.env.sessions.contains(&c.key))
            .collect();
        summary.probed = candidates.len();

        // Health entries share the probe limit and report from their own
        // task, so a slow one never holds back a dispatch.
        let limit = Arc::new(Semaphore::new(self.probe_concurrency));
        let mut probes = JoinSet::new();
        for channel in candidates.into_iter().chain(health) {
            let probe = Arc::clone(&self.probe);
            let limit = Arc::clone(&limit);
            let notifier = Arc::clone(&self.env.notifier);
            probes.spawn(async move {
                let permit = limit.acquire_owned().await.ok();
                let live = probe.is_live(&channel.capture_url).await;
                drop(permit);
                if channel.health_check && !live {
                    tracing::error!(url = %channel.url, "healthcheck failed");
                    notifier
                        .notify("[HEALTHCHECK FAILED]", &channel.url, Some(&channel.url))
                        .await;
                }
                (channel, live)
            });
        }

        // Remaining probes are aborted when `probes` drops.
        while let Some(joined) = probes.join_next().await {
            let (channel, live) = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("probe task failed: {e}");
                    continue;
                }
            };
            if channel.health_check {
                if live {
                    tracing::debug!(channel = %channel.key, "health ok");
                } else {
                    summary.health_failures += 1;
                }
                continue;
            }
            if !live {
                tracing::trace!(channel = %channel.key, "offline");
                continue;
            }
            summary.live += 1;
            if self.env.shutdown.is_cancelled() {
                break;
            }
            if self.source.has_changed() {
                tracing::info!("channel lists changed, restarting pass");
                summary.abandoned = true;
                break;
            }
            if self.dispatch(channel) {
                summary.dispatched += 1;
            }
        }
        summary
    }

    /// Claim the channel and start its task. Returns false if it is already
    /// being captured.
    fn dispatch(&self, channel: ChannelDescriptor) -> bool {
        let Some(claim) = self.env.sessions.try_claim(&channel.key) else {
            tracing::debug!(channel = %channel.key, "already capturing");
            return false;
        };
        tracing::debug!(channel = %channel.key, entry = %channel.name, "online, dispatching");
        if let Err(e) = self.source.remove_entry(&channel) {
            tracing::warn!(channel = %channel.key, "cannot remove entry: {e}");
        }

        let task = CaptureTask::new(channel, Arc::clone(&self.env));
        self.tracker.spawn(async move {
            let report = task.run_claimed(claim).await;
            log_report(&report);
        });
        true
    }

    /// Sleep up to the configured delay, waking early on shutdown or when a
    /// channel list changes.
    async fn pause(&self) {
        let mut remaining = self.delay;
        while !remaining.is_zero() {
            if self.source.has_changed() {
                tracing::debug!("channel lists changed, skipping delay");
                return;
            }
            let step = remaining.min(self.pause_step);
            tokio::select! {
                () = self.env.shutdown.cancelled() => return,
                () = tokio::time::sleep(step) => {}
            }
            remaining -= step;
        }
    }

    /// Stop accepting work and wait for every in-flight task to finish.
    pub async fn drain(&self) {
        self.env.shutdown.cancel();
        self.tracker.close();
        let active = self.in_flight();
        if active > 0 {
            tracing::warn!(
                active,
                channels = ?self.env.sessions.keys(),
                "stopping, waiting for sessions to finalize"
            );
        }
        loop {
            tokio::select! {
                () = self.tracker.wait() => break,
                () = tokio::time::sleep(DRAIN_REPORT_EVERY) => {
                    tracing::info!(remaining = self.in_flight(), "still finalizing");
                }
            }
        }
        tracing::info!("all sessions finished");
    }
}

fn log_report(report: &TaskReport) {
    let dir = report
        .directory
        .as_deref()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    match &report.outcome {
        TaskOutcome::Completed { ended_by } => tracing::info!(
            channel = %report.key,
            ?ended_by,
            elapsed = report.elapsed.map(|e| e.as_secs()).unwrap_or_default(),
            dir = %dir,
            "session saved"
        ),
        TaskOutcome::Failed { stage, error } => tracing::warn!(
            channel = %report.key,
            stage = %stage,
            dir = %dir,
            "session failed: {error}"
        ),
        TaskOutcome::Filtered | TaskOutcome::AlreadyActive => tracing::debug!(
            channel = %report.key,
            outcome = ?report.outcome,
            "session skipped"
        ),
    }
}
