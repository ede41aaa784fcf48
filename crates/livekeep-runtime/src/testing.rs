//! Fakes for the collaborator traits, shared by the task and supervisor tests.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use livekeep_core::{
    CaptureMethod, CaptureTarget, ChannelDescriptor, CommandLine, CoreError, ProxyPool,
    StreamMetadata, UrlPolicy,
};
use livekeep_proc::LivenessProbe;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::metadata::{MetadataResolver, ResolveError};
use crate::notify::Notifier;
use crate::sessions::ActiveSessions;
use crate::task::{SessionCommands, TaskEnv};

pub const URL: &str = "https://www.twitch.tv/someone";

/// Recorders as `sh -c` scripts receiving the session base path as `$1`.
/// An empty script names a program that does not exist.
#[derive(Clone, Copy)]
pub struct Scripts {
    pub media: &'static str,
    pub chat: &'static str,
}

pub const IDLE: Scripts = Scripts {
    media: "exec sleep 30",
    chat: "exec sleep 30",
};

impl SessionCommands for Scripts {
    fn media(&self, _method: &CaptureMethod, target: &CaptureTarget<'_>) -> CommandLine {
        script(self.media, target)
    }

    fn chat(&self, target: &CaptureTarget<'_>) -> CommandLine {
        script(self.chat, target)
    }
}

fn script(body: &str, target: &CaptureTarget<'_>) -> CommandLine {
    if body.is_empty() {
        return CommandLine::new("livekeep-missing-recorder");
    }
    CommandLine::new("sh")
        .args(["-c", body, "sh"])
        .arg(target.base.to_string_lossy())
}

pub struct FixedResolver {
    doc: Option<Value>,
    pub calls: AtomicUsize,
}

impl FixedResolver {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for FixedResolver {
    async fn resolve(&self, _url: &str) -> Result<StreamMetadata, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.doc {
            Some(doc) => Ok(StreamMetadata::from_json(doc.clone())?),
            None => Err(ResolveError::Metadata(CoreError::NotAnObject)),
        }
    }
}

/// Keeps notification titles and bodies, each recorded after an optional
/// delivery delay.
#[derive(Default)]
pub struct Recording {
    sent: Mutex<Vec<(String, String)>>,
    delay_ms: AtomicU64,
}

impl Recording {
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn titles(&self) -> Vec<String> {
        self.lock().iter().map(|(title, _)| title.clone()).collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.lock().iter().map(|(_, body)| body.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.sent.lock().expect("notification lock")
    }
}

#[async_trait]
impl Notifier for Recording {
    async fn notify(&self, title: &str, body: &str, _click: Option<&str>) {
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        tokio::time::sleep(delay).await;
        self.lock().push((title.to_string(), body.to_string()));
    }
}

/// Answers every probe the same way and counts the calls.
pub struct FixedProbe {
    live: bool,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FixedProbe {
    pub fn new(live: bool) -> Self {
        Self {
            live,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn slow(live: bool, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(live)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for FixedProbe {
    async fn is_live(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.live
    }
}

pub struct Fixture {
    pub env: Arc<TaskEnv>,
    pub resolver: Arc<FixedResolver>,
    pub notes: Arc<Recording>,
    pub root: tempfile::TempDir,
}

/// A live Twitch stream titled "Just chatting" by "Someone".
pub fn stream() -> Value {
    json!({
        "extractor": "twitch:stream",
        "id": "someone",
        "description": "Just chatting",
        "uploader": "Someone",
        "webpage_url": URL,
    })
}

/// A live YouTube stream by "Chan"; the title carries the date stamp
/// YouTube appends to live titles.
pub fn youtube_stream() -> Value {
    json!({
        "extractor": "youtube",
        "id": "abc123",
        "title": "Morning stream 2026-10-19 09:00",
        "description": "",
        "uploader": "Chan",
        "webpage_url": "https://www.youtube.com/watch?v=abc123",
    })
}

pub fn fixture(doc: Option<Value>, scripts: Scripts) -> Fixture {
    fixture_with(doc, scripts, CaptureMethod::default())
}

pub fn fixture_with(doc: Option<Value>, scripts: Scripts, method: CaptureMethod) -> Fixture {
    let root = tempfile::tempdir().expect("tempdir");
    let resolver = Arc::new(FixedResolver {
        doc,
        calls: AtomicUsize::new(0),
    });
    let notes = Arc::new(Recording::default());
    let env = Arc::new(TaskEnv {
        output: root.path().join("out"),
        method,
        commands: Arc::new(scripts),
        proxies: Arc::new(ProxyPool::default()),
        resolver: resolver.clone(),
        notifier: notes.clone(),
        thumbnails: None,
        po_tokens: None,
        sessions: ActiveSessions::new(),
        shutdown: CancellationToken::new(),
        poll_interval: Duration::from_millis(50),
        kill_grace: Duration::from_secs(2),
    });
    Fixture {
        env,
        resolver,
        notes,
        root,
    }
}

pub fn channel() -> ChannelDescriptor {
    ChannelDescriptor::new("someone", "/list.toml", URL, &UrlPolicy::default())
}

/// Sorted entry names of `dir`, empty when it does not exist.
pub fn names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn has_ext(names: &[String], ext: &str) -> bool {
    names.iter().any(|n| n.ends_with(&format!(".{ext}")))
}
