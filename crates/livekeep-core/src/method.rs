//! Capture method selection and the command lines for the external tools.
//!
//! The method is a tagged variant carrying its own parameters; the builder
//! assembles each command in order from typed parts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where the bgutil PO token provider listens unless configured otherwise.
/// yt-dlp's provider plugin already uses this address on its own.
pub const DEFAULT_POT_PROVIDER: &str = "http://127.0.0.1:4416";

#[rustfmt::skip]
const STREAMLINK_DEFAULTS: &[&str] = &[
    "--fs-safe-rules", "Windows",
    "--twitch-disable-ads",
    "--hls-live-restart",
    "--http-timeout", "180",
    "--stream-segment-threads", "2",
    "--stream-segment-timeout", "180",
    "--stream-segment-attempts", "300",
    "--hls-segment-ignore-names", "preloading",
    "--hls-playlist-reload-attempts", "30",
    "--hls-live-edge", "5",
    "--stream-timeout", "120",
    "--ringbuffer-size", "64M",
    "--loglevel", "trace",
    "--twitch-disable-hosting",
];

#[rustfmt::skip]
const YTDLP_DEFAULTS: &[&str] = &[
    "--verbose",
    "--ignore-config",
    "--merge-output-format", "mp4",
    "--retries", "30",
    "-N", "3",
];

#[rustfmt::skip]
const YTARCHIVE_DEFAULTS: &[&str] = &[
    "--threads", "3",
    "--trace",
    "--no-frag-files",
    "--no-save-state",
    "--write-mux-file",
    "--no-merge",
    "--add-metadata",
];

// ─── CommandLine ──────────────────────────────────────────────────

/// A program and its arguments, ready to hand to a process spawner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn opt(self, flag: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_words::quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_words::quote(arg))?;
        }
        Ok(())
    }
}

// ─── Method ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    Streamlink,
    YtDlp,
    YtArchive,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Streamlink => "streamlink",
            Self::YtDlp => "yt-dlp",
            Self::YtArchive => "ytarchive",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "streamlink" => Ok(Self::Streamlink),
            "yt-dlp" | "ytdlp" | "dlp" => Ok(Self::YtDlp),
            "ytarchive" | "yta" => Ok(Self::YtArchive),
            _ => Err(CoreError::UnknownMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamlinkArgs {
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YtDlpArgs {
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YtArchiveArgs {
    pub extra: Vec<String>,
    /// Used for non-YouTube channels, which ytarchive cannot record.
    pub fallback: StreamlinkArgs,
}

/// How the media stream is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMethod {
    Streamlink(StreamlinkArgs),
    YtDlp(YtDlpArgs),
    YtArchive(YtArchiveArgs),
}

impl Default for CaptureMethod {
    fn default() -> Self {
        Self::Streamlink(StreamlinkArgs::default())
    }
}

impl CaptureMethod {
    /// Method actually used for a stream from the given site.
    pub fn effective_for(&self, youtube: bool) -> CaptureMethod {
        match self {
            Self::YtArchive(args) if !youtube => Self::Streamlink(args.fallback.clone()),
            other => other.clone(),
        }
    }

    /// ytarchive leaves separate audio/video files plus a mux command that
    /// must be run after the recorder exits.
    pub fn needs_manual_merge(&self) -> bool {
        matches!(self, Self::YtArchive(_))
    }
}

// ─── Builder ──────────────────────────────────────────────────────

/// Per-session inputs for the capture commands.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTarget<'a> {
    /// URL handed to the media recorder.
    pub url: &'a str,
    /// Page URL handed to the chat recorder.
    pub chat_url: &'a str,
    pub quality: &'a str,
    /// `<dir>/<stem>` without extension.
    pub base: &'a Path,
    /// Whether the resolver identified the stream as YouTube.
    pub youtube: bool,
    pub proxy: Option<&'a str>,
    /// Proof-of-origin token for ytarchive.
    pub po_token: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    /// Netscape cookie file passed to tools that accept one.
    pub cookies: Option<PathBuf>,
    /// PO token provider URL handed to yt-dlp, only when it is not the
    /// default address.
    pot_provider: Option<String>,
}

impl CommandBuilder {
    pub fn new(cookies: Option<PathBuf>) -> Self {
        Self {
            cookies,
            pot_provider: None,
        }
    }

    #[must_use]
    pub fn with_pot_provider(mut self, url: &str) -> Self {
        let url = url.trim().trim_end_matches('/');
        self.pot_provider = (!url.is_empty() && url != DEFAULT_POT_PROVIDER).then(|| url.to_string());
        self
    }

    fn extractor_args(&self) -> Option<String> {
        self.pot_provider
            .as_deref()
            .map(|url| format!("youtubepot-bgutilhttp:base_url={url}"))
    }

    fn cookies_arg(&self) -> Option<String> {
        self.cookies
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    pub fn media(&self, method: &CaptureMethod, target: &CaptureTarget<'_>) -> CommandLine {
        match method {
            CaptureMethod::Streamlink(args) => CommandLine::new("streamlink")
                .args(STREAMLINK_DEFAULTS.iter().copied())
                .args(args.extra.iter().cloned())
                .opt("--http-proxy", target.proxy)
                .arg("--url")
                .arg(target.url)
                .arg("--output")
                .arg(with_ext(target.base, "ts"))
                .arg("--default-stream")
                .arg(target.quality),
            CaptureMethod::YtDlp(args) => {
                let live_from_start = target.youtube.then_some("--live-from-start");
                CommandLine::new("yt-dlp")
                    .args(YTDLP_DEFAULTS.iter().copied())
                    .args(live_from_start)
                    .args(args.extra.iter().cloned())
                    .opt("--extractor-args", self.extractor_args())
                    .opt("--cookies", self.cookies_arg())
                    .opt("--proxy", target.proxy)
                    .arg("-o")
                    .arg(with_ext(target.base, "mp4"))
                    .arg(target.url)
            }
            CaptureMethod::YtArchive(args) => CommandLine::new("ytarchive")
                .args(YTARCHIVE_DEFAULTS.iter().copied())
                .args(args.extra.iter().cloned())
                .opt("--potoken", target.po_token)
                .opt("--cookies", self.cookies_arg())
                .opt("--proxy", target.proxy)
                .arg("--output")
                .arg(target.base.to_string_lossy())
                .arg(target.url)
                .arg(target.quality),
        }
    }

    pub fn chat(&self, target: &CaptureTarget<'_>) -> CommandLine {
        CommandLine::new("chat_downloader")
            .opt("--cookies", self.cookies_arg())
            .opt("--proxy", target.proxy)
            .arg("--output")
            .arg(with_ext(target.base, "json"))
            .arg("--max_attempts")
            .arg("99999999")
            .arg(target.chat_url)
    }

    /// Stream metadata as a single JSON document on stdout.
    pub fn metadata(&self, url: &str, proxy: Option<&str>) -> CommandLine {
        CommandLine::new("yt-dlp")
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--quiet"])
            .opt("--extractor-args", self.extractor_args())
            .opt("--cookies", self.cookies_arg())
            .opt("--proxy", proxy)
            .arg(url)
    }

    pub fn probe(&self, url: &str, proxy: Option<&str>) -> CommandLine {
        CommandLine::new("streamlink")
            .arg("--twitch-disable-hosting")
            .opt("--http-proxy", proxy)
            .arg("--url")
            .arg(url)
    }
}

fn with_ext(base: &Path, ext: &str) -> String {
    format!("{}.{ext}", base.to_string_lossy())
}

// ─── Proxies ──────────────────────────────────────────────────────

/// Round-robin over the configured proxies.
#[derive(Debug, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
    next: AtomicUsize,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> Option<&str> {
        if self.proxies.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(&self.proxies[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(base: &Path, youtube: bool) -> CaptureTarget<'_> {
        CaptureTarget {
            url: "https://www.youtube.com/@chan/live",
            chat_url: "https://www.youtube.com/watch?v=abc",
            quality: "best",
            base,
            youtube,
            proxy: None,
            po_token: None,
        }
    }

    #[test]
    fn method_kind_parsing() {
        assert_eq!("streamlink".parse::<MethodKind>().expect("ok"), MethodKind::Streamlink);
        assert_eq!("yt-dlp".parse::<MethodKind>().expect("ok"), MethodKind::YtDlp);
        assert_eq!("YTA".parse::<MethodKind>().expect("ok"), MethodKind::YtArchive);
        assert!("ffmpeg".parse::<MethodKind>().is_err());
    }

    #[test]
    fn ytarchive_falls_back_for_non_youtube() {
        let method = CaptureMethod::YtArchive(YtArchiveArgs {
            extra: vec!["--x".into()],
            fallback: StreamlinkArgs {
                extra: vec!["--y".into()],
            },
        });
        assert!(matches!(method.effective_for(true), CaptureMethod::YtArchive(_)));
        let fallback = method.effective_for(false);
        assert_eq!(
            fallback,
            CaptureMethod::Streamlink(StreamlinkArgs {
                extra: vec!["--y".into()]
            })
        );
        assert!(!fallback.needs_manual_merge());
        assert!(method.needs_manual_merge());
    }

    #[test]
    fn streamlink_command_shape() {
        let base = PathBuf::from("/out/[live] s/s");
        let cmd = CommandBuilder::default().media(&CaptureMethod::default(), &target(&base, true));
        assert_eq!(cmd.program, "streamlink");
        let tail: Vec<&str> = cmd.args.iter().rev().take(6).rev().map(String::as_str).collect();
        assert_eq!(
            tail,
            [
                "--url",
                "https://www.youtube.com/@chan/live",
                "--output",
                "/out/[live] s/s.ts",
                "--default-stream",
                "best"
            ]
        );
    }

    #[test]
    fn ytdlp_live_from_start_only_for_youtube() {
        let base = PathBuf::from("/o/s");
        let method = CaptureMethod::YtDlp(YtDlpArgs::default());
        let builder = CommandBuilder::new(Some(PathBuf::from("/c.txt")));
        let yt = builder.media(&method, &target(&base, true));
        assert!(yt.args.iter().any(|a| a == "--live-from-start"));
        assert!(yt.args.windows(2).any(|w| w == ["--cookies", "/c.txt"]));
        assert_eq!(yt.args.last().map(String::as_str), Some("https://www.youtube.com/@chan/live"));

        let other = builder.media(&method, &target(&base, false));
        assert!(!other.args.iter().any(|a| a == "--live-from-start"));
    }

    #[test]
    fn ytarchive_command_ends_with_url_and_quality() {
        let base = PathBuf::from("/o/s");
        let method = CaptureMethod::YtArchive(YtArchiveArgs::default());
        let cmd = CommandBuilder::default().media(&method, &target(&base, true));
        assert_eq!(cmd.program, "ytarchive");
        let n = cmd.args.len();
        assert_eq!(cmd.args[n - 2], "https://www.youtube.com/@chan/live");
        assert_eq!(cmd.args[n - 1], "best");
        assert!(cmd.args.windows(2).any(|w| w == ["--output", "/o/s"]));
    }

    #[test]
    fn pot_provider_only_passed_when_not_default() {
        let base = PathBuf::from("/o/s");
        let method = CaptureMethod::YtDlp(YtDlpArgs::default());
        let custom = CommandBuilder::default().with_pot_provider("http://bgutil:4416/");
        let cmd = custom.media(&method, &target(&base, true));
        assert!(cmd.args.windows(2).any(|w| w
            == ["--extractor-args", "youtubepot-bgutilhttp:base_url=http://bgutil:4416"]));
        assert!(custom.metadata("https://x", None).args.iter().any(|a| a == "--extractor-args"));

        let default = CommandBuilder::default().with_pot_provider(DEFAULT_POT_PROVIDER);
        assert!(!default.media(&method, &target(&base, true)).args.iter().any(|a| a == "--extractor-args"));
        assert!(!default.metadata("https://x", None).args.iter().any(|a| a == "--extractor-args"));
    }

    #[test]
    fn ytarchive_potoken() {
        let base = PathBuf::from("/o/s");
        let method = CaptureMethod::YtArchive(YtArchiveArgs::default());
        let mut t = target(&base, true);
        t.po_token = Some("tok");
        let cmd = CommandBuilder::default().media(&method, &t);
        assert!(cmd.args.windows(2).any(|w| w == ["--potoken", "tok"]));
        let n = cmd.args.len();
        assert_eq!(cmd.args[n - 1], "best");
    }

    #[test]
    fn metadata_command() {
        let builder = CommandBuilder::new(Some(PathBuf::from("/c.txt")));
        assert_eq!(
            builder.metadata("https://www.twitch.tv/a", Some("http://p")).to_string(),
            "yt-dlp --dump-single-json --skip-download --no-playlist --quiet \
             --cookies /c.txt --proxy http://p https://www.twitch.tv/a"
        );
    }

    #[test]
    fn chat_command_uses_page_url_and_proxy() {
        let base = PathBuf::from("/o/s");
        let mut t = target(&base, true);
        t.proxy = Some("socks5://127.0.0.1:1080");
        let cmd = CommandBuilder::default().chat(&t);
        assert_eq!(cmd.program, "chat_downloader");
        assert!(cmd.args.windows(2).any(|w| w == ["--proxy", "socks5://127.0.0.1:1080"]));
        assert!(cmd.args.windows(2).any(|w| w == ["--output", "/o/s.json"]));
        assert_eq!(cmd.args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn probe_command() {
        let cmd = CommandBuilder::default().probe("https://twitch.tv/x", None);
        assert_eq!(cmd.to_string(), "streamlink --twitch-disable-hosting --url https://twitch.tv/x");
    }

    #[test]
    fn display_quotes_whitespace() {
        let cmd = CommandLine::new("echo").arg("a b").arg("c").arg("");
        assert_eq!(cmd.to_string(), "echo 'a b' c ''");
    }

    #[test]
    fn proxy_pool_round_robin() {
        let pool = ProxyPool::new(vec!["a".into(), "b".into()]);
        assert_eq!(pool.next(), Some("a"));
        assert_eq!(pool.next(), Some("b"));
        assert_eq!(pool.next(), Some("a"));
        assert_eq!(ProxyPool::default().next(), None);
    }
}
