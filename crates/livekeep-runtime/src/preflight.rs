//! Startup checks for the external tools.

use std::time::Duration;

use livekeep_core::{CommandLine, MethodKind};
use livekeep_proc::run_status;

struct CheckResult {
    passed: bool,
    label: String,
}

impl CheckResult {
    fn pass(label: impl Into<String>) -> Self {
        Self { passed: true, label: label.into() }
    }

    fn fail(label: impl Into<String>) -> Self {
        Self { passed: false, label: label.into() }
    }
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "[{}] {}", tag, self.label)
    }
}

async fn in_path(program: &str) -> bool {
    let lookup = CommandLine::new("sh").args(["-c", "command -v \"$1\"", "sh", program]);
    run_status(&lookup, Duration::from_secs(10)).await.unwrap_or(false)
}

/// Check the tools every session needs and pick a media recorder that is
/// actually installed.
pub async fn run_preflight(requested: MethodKind) -> MethodKind {
    let mut installed = Vec::new();
    for tool in ["streamlink", "yt-dlp", "ytarchive", "ffmpeg", "chat_downloader"] {
        if in_path(tool).await {
            installed.push(tool);
        }
    }
    let has = |tool: &str| installed.iter().any(|t| *t == tool);

    for tool in ["streamlink", "yt-dlp", "chat_downloader"] {
        let check = if has(tool) {
            CheckResult::pass(format!("{tool} found in PATH"))
        } else {
            CheckResult::fail(format!("{tool} not found in PATH"))
        };
        if check.passed {
            tracing::debug!("{check}");
        } else {
            tracing::warn!("{check}");
        }
    }

    select_method(requested, has)
}

/// ytarchive falls back to yt-dlp when missing; yt-dlp and ytarchive both
/// need ffmpeg to merge and fall back to streamlink without it.
fn select_method(requested: MethodKind, has: impl Fn(&str) -> bool) -> MethodKind {
    let mut method = requested;
    if method == MethodKind::YtArchive && !has("ytarchive") {
        tracing::warn!("ytarchive not found, falling back to yt-dlp");
        method = MethodKind::YtDlp;
    }
    if method != MethodKind::Streamlink && !has("ffmpeg") {
        tracing::warn!("ffmpeg not found, falling back to streamlink");
        method = MethodKind::Streamlink;
    }
    if method != requested {
        tracing::info!(requested = %requested, using = %method, "capture method changed");
    }
    method
}
