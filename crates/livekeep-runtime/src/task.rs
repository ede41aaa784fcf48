//! One capture session, from claim to the final rename.
//!
//! ```text
//! claim ─► resolve ─► filter? ─► mkdir [live] ─► info ─┬─► start group ─► poll
//!                                                       └─► notify/thumb ───┤
//!                              rename ◄─ convert chat ◄─ merge ◄────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use livekeep_core::{
    CaptureMethod, CaptureTarget, ChannelDescriptor, ChannelKey, CommandBuilder, CommandLine,
    ProxyPool, SessionName, StateMachine, StreamMetadata, TaskState, format_elapsed,
};
use livekeep_proc::{CaptureProcessGroup, GroupSpec, MergePlan, ProcError, run_merge};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::chat_log;
use crate::metadata::{MetadataResolver, ResolveError};
use crate::notify::Notifier;
use crate::potoken::PoTokenProvider;
use crate::sessions::{ActiveSessions, SessionClaim};
use crate::thumbnail::ThumbnailFetcher;

pub const CAPTURE_POLL: Duration = Duration::from_secs(1);

/// Produces the recorder command lines for a session.
pub trait SessionCommands: Send + Sync {
    fn media(&self, method: &CaptureMethod, target: &CaptureTarget<'_>) -> CommandLine;
    fn chat(&self, target: &CaptureTarget<'_>) -> CommandLine;
}

impl SessionCommands for CommandBuilder {
    fn media(&self, method: &CaptureMethod, target: &CaptureTarget<'_>) -> CommandLine {
        CommandBuilder::media(self, method, target)
    }

    fn chat(&self, target: &CaptureTarget<'_>) -> CommandLine {
        CommandBuilder::chat(self, target)
    }
}

/// Collaborators shared by every capture task.
pub struct TaskEnv {
    pub output: PathBuf,
    pub method: CaptureMethod,
    pub commands: Arc<dyn SessionCommands>,
    pub proxies: Arc<ProxyPool>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub notifier: Arc<dyn Notifier>,
    /// `None` skips thumbnail downloads.
    pub thumbnails: Option<ThumbnailFetcher>,
    /// Used for ytarchive sessions only.
    pub po_tokens: Option<PoTokenProvider>,
    pub sessions: ActiveSessions,
    pub shutdown: CancellationToken,
    pub poll_interval: Duration,
    pub kill_grace: Duration,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("metadata lookup failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("cannot create {}: {source}", path.display())]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot start recorders: {0}")]
    Spawn(#[source] ProcError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The media recorder exited on its own.
    StreamEnded,
    /// Shutdown was requested while recording.
    Shutdown,
}

#[derive(Debug)]
pub enum TaskOutcome {
    /// Another task holds the channel.
    AlreadyActive,
    /// The stream did not pass the channel's content filter.
    Filtered,
    Completed { ended_by: EndReason },
    Failed { stage: TaskState, error: String },
}

#[derive(Debug)]
pub struct TaskReport {
    pub key: ChannelKey,
    pub state: TaskState,
    pub history: Vec<TaskState>,
    pub outcome: TaskOutcome,
    /// Recording duration, when recorders were started.
    pub elapsed: Option<Duration>,
    /// Where the session ended up on disk, if a directory was created.
    pub directory: Option<PathBuf>,
}

/// Resolved naming and metadata for one session.
struct Session {
    meta: StreamMetadata,
    name: SessionName,
    user: String,
    title: String,
}

pub struct CaptureTask {
    channel: ChannelDescriptor,
    env: Arc<TaskEnv>,
    machine: StateMachine,
}

impl CaptureTask {
    pub fn new(channel: ChannelDescriptor, env: Arc<TaskEnv>) -> Self {
        Self {
            channel,
            env,
            machine: StateMachine::new(),
        }
    }

    /// Claim the channel and run the session. Reports `AlreadyActive`
    /// without doing anything if the channel is already being captured.
    pub async fn run(self) -> TaskReport {
        match self.env.sessions.try_claim(&self.channel.key) {
            Some(claim) => self.run_claimed(claim).await,
            None => {
                tracing::debug!(channel = %self.channel.key, "already capturing, skipped");
                self.report(TaskOutcome::AlreadyActive, None, None)
            }
        }
    }

    /// Run with a claim taken by the caller. The claim is released after
    /// every cleanup step, or during unwinding if the task panics.
    pub async fn run_claimed(mut self, claim: SessionClaim) -> TaskReport {
        debug_assert_eq!(claim.key(), &self.channel.key);
        let report = self.drive().await;
        drop(claim);
        report
    }

    async fn drive(&mut self) -> TaskReport {
        self.transition(TaskState::Resolving);
        let session = match self.resolve().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.transition(TaskState::Done);
                return self.report(TaskOutcome::Filtered, None, None);
            }
            Err(e) => return self.failed(TaskState::Resolving, &e, None),
        };
        self.transition(TaskState::Capturing);
        self.capture(session).await
    }

    async fn resolve(&self) -> Result<Option<Session>, TaskError> {
        let meta = self.env.resolver.resolve(&self.channel.capture_url).await?;
        let user = meta.display_user();
        let title = meta.display_title();

        if !self.channel.filter.matches(&title, meta.description()) {
            tracing::info!(channel = %self.channel.key, title = %title, "stream filtered out");
            return Ok(None);
        }

        let name = SessionName::new(Local::now().naive_local(), &user, &title, &self.channel.folder);
        Ok(Some(Session {
            meta,
            name,
            user,
            title,
        }))
    }

    async fn capture(&mut self, session: Session) -> TaskReport {
        let env = Arc::clone(&self.env);
        let working = session.name.working_dir(&env.output);
        let final_dir = session.name.final_dir(&env.output);

        if let Err(source) = tokio::fs::create_dir_all(&working).await {
            let e = TaskError::Workdir {
                path: working,
                source,
            };
            return self.failed(TaskState::Capturing, &e, None);
        }

        let proxy = env.proxies.next().map(str::to_string);
        self.write_info(&session, &working).await;
        let announcing = tokio::spawn(announce(
            Arc::clone(&env),
            self.announcement(&session, &working, proxy.clone()),
        ));

        let youtube = session.meta.is_youtube();
        let method = env.method.effective_for(youtube);
        let po_token = match (&method, &env.po_tokens) {
            (CaptureMethod::YtArchive(_), Some(provider)) => provider.fetch(proxy.as_deref()).await,
            _ => None,
        };
        let base = session.name.base(&working);
        let target = CaptureTarget {
            url: &self.channel.capture_url,
            chat_url: session.meta.page_url(&self.channel.url),
            quality: &self.channel.quality,
            base: &base,
            youtube,
            proxy: proxy.as_deref(),
            po_token: po_token.as_deref(),
        };
        let media_cmd = env.commands.media(&method, &target);
        let chat_cmd = env.commands.chat(&target);
        tracing::debug!(channel = %self.channel.key, cmd = %media_cmd, "media command");
        tracing::debug!(channel = %self.channel.key, cmd = %chat_cmd, "chat command");

        let media_log = session.name.file(&working, "log");
        let chat_log = session.name.file(&working, "chat");
        let spec = GroupSpec {
            media: &media_cmd,
            chat: &chat_cmd,
            cwd: &working,
            media_log: &media_log,
            chat_log: &chat_log,
            kill_grace: Some(env.kill_grace),
        };

        let started = Instant::now();
        let mut group = match CaptureProcessGroup::start(&spec) {
            Ok(group) => group,
            Err(e) => {
                let e = TaskError::Spawn(e);
                self.settle(announcing).await;
                let directory = rename_out_of_live(&working, &final_dir).await;
                return self.failed(TaskState::Capturing, &e, Some(directory));
            }
        };

        let ended_by = self.wait_for_end(&mut group).await;
        let elapsed = started.elapsed();
        // The online notification goes out before the offline one, and the
        // thumbnail lands before the directory is renamed.
        self.settle(announcing).await;
        match ended_by {
            EndReason::StreamEnded => {
                tracing::info!(
                    channel = %self.channel.key,
                    elapsed = %format_elapsed(elapsed),
                    "[offline] {} - {}",
                    session.user,
                    session.title
                );
                let title = format!("[offline] {} ({})", session.user, format_elapsed(elapsed));
                env.notifier.notify(&title, &session.title, None).await;
            }
            EndReason::Shutdown => {
                tracing::info!(
                    channel = %self.channel.key,
                    elapsed = %format_elapsed(elapsed),
                    "recording interrupted by shutdown"
                );
            }
        }

        self.transition(TaskState::Finalizing);
        self.finalize(&mut group, &method, &working, &session).await;
        let directory = rename_out_of_live(&working, &final_dir).await;
        self.transition(TaskState::Done);
        self.report(TaskOutcome::Completed { ended_by }, Some(elapsed), Some(directory))
    }

    async fn write_info(&self, session: &Session, working: &Path) {
        let info = session.name.file(working, "info");
        match serde_json::to_vec_pretty(&session.meta.raw) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&info, bytes).await {
                    tracing::warn!(path = %info.display(), "cannot write stream info: {e}");
                }
            }
            Err(e) => tracing::warn!(channel = %self.channel.key, "cannot encode stream info: {e}"),
        }
    }

    fn announcement(&self, session: &Session, working: &Path, proxy: Option<String>) -> Announcement {
        let meta = &session.meta;
        let thumbnail = meta
            .id
            .as_deref()
            .filter(|_| meta.is_youtube())
            .map(|id| (id.to_string(), session.name.file(working, "jpg")));

        let online_for = meta
            .released_at()
            .and_then(|released| (Utc::now() - released).to_std().ok())
            .map(format_elapsed);
        let body = match &online_for {
            Some(since) => format!("{}\n(online for {since})", session.title),
            None => session.title.clone(),
        };
        tracing::info!(
            channel = %self.channel.key,
            dir = %working.display(),
            online_for = online_for.as_deref().unwrap_or("-"),
            "[ONLINE] {} - {}",
            session.user,
            session.title
        );
        Announcement {
            key: self.channel.key.clone(),
            title: format!("[ONLINE] {}", session.user),
            body,
            click: meta.page_url(&self.channel.url).to_string(),
            thumbnail,
            proxy,
        }
    }

    async fn settle(&self, announcing: JoinHandle<()>) {
        if let Err(e) = announcing.await {
            tracing::warn!(channel = %self.channel.key, "online announcement failed: {e}");
        }
    }

    async fn wait_for_end(&self, group: &mut CaptureProcessGroup) -> EndReason {
        let mut tick = tokio::time::interval(self.env.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = self.env.shutdown.cancelled() => {
                    if let Err(e) = group.terminate_media(false).await {
                        tracing::warn!(channel = %self.channel.key, "stopping media recorder: {e}");
                    }
                    return EndReason::Shutdown;
                }
                _ = tick.tick() => {
                    if !group.is_media_alive() {
                        if let Some(status) = group.media_status() {
                            tracing::debug!(channel = %self.channel.key, %status, "media recorder exited");
                        }
                        return EndReason::StreamEnded;
                    }
                }
            }
        }
    }

    async fn finalize(
        &self,
        group: &mut CaptureProcessGroup,
        method: &CaptureMethod,
        working: &Path,
        session: &Session,
    ) {
        let graceful = !group.is_chat_alive();
        if let Err(e) = group.terminate_chat(graceful).await {
            tracing::warn!(channel = %self.channel.key, "stopping chat recorder: {e}");
        }

        if method.needs_manual_merge() {
            merge(group, working).await;
        }

        if let Err(e) = group.close() {
            tracing::warn!(channel = %self.channel.key, "closing process logs: {e}");
        }

        let json = session.name.file(working, "json");
        match tokio::task::spawn_blocking(move || chat_log::convert(&json)).await {
            Ok(Ok(Some((path, summary)))) => tracing::debug!(
                path = %path.display(),
                messages = summary.messages,
                users = summary.users,
                "chat log converted"
            ),
            Ok(Ok(None)) => tracing::debug!(channel = %self.channel.key, "no chat log recorded"),
            Ok(Err(e)) => tracing::error!(channel = %self.channel.key, "chat log conversion: {e}"),
            Err(e) => tracing::error!(channel = %self.channel.key, "chat log conversion panicked: {e}"),
        }
    }

    fn transition(&mut self, next: TaskState) {
        if let Err(e) = self.machine.advance(next) {
            tracing::error!(channel = %self.channel.key, "{e}");
        }
    }

    fn failed(&mut self, stage: TaskState, error: &TaskError, directory: Option<PathBuf>) -> TaskReport {
        tracing::error!(channel = %self.channel.key, stage = %stage, "{error}");
        self.machine.fail();
        let outcome = TaskOutcome::Failed {
            stage,
            error: error.to_string(),
        };
        self.report(outcome, None, directory)
    }

    fn report(&self, outcome: TaskOutcome, elapsed: Option<Duration>, directory: Option<PathBuf>) -> TaskReport {
        TaskReport {
            key: self.channel.key.clone(),
            state: self.machine.state(),
            history: self.machine.history().to_vec(),
            outcome,
            elapsed,
            directory,
        }
    }
}

/// Best-effort side effects of going online. They run next to the
/// recorders so a slow network never delays the capture.
struct Announcement {
    key: ChannelKey,
    title: String,
    body: String,
    click: String,
    /// Video id and destination.
    thumbnail: Option<(String, PathBuf)>,
    proxy: Option<String>,
}

async fn announce(env: Arc<TaskEnv>, note: Announcement) {
    env.notifier.notify(&note.title, &note.body, Some(&note.click)).await;
    if let (Some(fetcher), Some((id, dest))) = (&env.thumbnails, &note.thumbnail) {
        if !fetcher.fetch(id, dest, note.proxy.as_deref()).await {
            tracing::debug!(channel = %note.key, "no thumbnail saved");
        }
    }
}

/// Run the ytarchive mux command. Failures keep every intermediate file.
async fn merge(group: &CaptureProcessGroup, working: &Path) {
    let plan = match MergePlan::discover(working) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            tracing::warn!(dir = %working.display(), "no mux command found, skipping merge");
            return;
        }
        Err(e) => {
            tracing::error!(dir = %working.display(), "merge: {e}");
            return;
        }
    };
    let stderr = group.media_log_stdio().unwrap_or_else(|_| Stdio::null());
    tracing::info!(dir = %working.display(), cmd = %plan.command, "merging");
    if let Err(e) = run_merge(&plan, working, stderr).await {
        tracing::error!(dir = %working.display(), "merge failed: {e}");
    }
}

/// Returns where the session directory is after the attempt.
async fn rename_out_of_live(working: &Path, final_dir: &Path) -> PathBuf {
    match tokio::fs::rename(working, final_dir).await {
        Ok(()) => final_dir.to_path_buf(),
        Err(e) => {
            tracing::error!(
                from = %working.display(),
                to = %final_dir.display(),
                "cannot rename session directory: {e}"
            );
            working.to_path_buf()
        }
    }
}
