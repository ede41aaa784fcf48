//! CLI definition using clap derive. Every option can also come from the
//! environment.

use std::path::PathBuf;

use clap::Parser;
use livekeep_core::{
    CaptureMethod, DEFAULT_POT_PROVIDER, MethodKind, StreamlinkArgs, UrlPolicy, YtArchiveArgs,
    YtDlpArgs,
};

pub const ENV_ARGS_STREAMLINK: &str = "LIVEKEEP_ARGS_STREAMLINK";
pub const ENV_ARGS_YTDLP: &str = "LIVEKEEP_ARGS_YTDLP";
pub const ENV_ARGS_YTARCHIVE: &str = "LIVEKEEP_ARGS_YTARCHIVE";

#[derive(Parser, Debug)]
#[command(name = "livekeep", version, about = "Watch channel lists and record live streams")]
pub struct Cli {
    /// Root directory for recorded sessions
    #[arg(short, long, env = "LIVEKEEP_OUTPUT", default_value = ".")]
    pub output: PathBuf,

    /// Log file. A directory gets one file per day (YYYY-MM-DD.log)
    #[arg(short, long, env = "LIVEKEEP_LOG")]
    pub log: Option<PathBuf>,

    /// Seconds to wait between passes over the channel lists
    #[arg(short, long, env = "LIVEKEEP_DELAY", default_value_t = 15)]
    pub delay: u64,

    /// Channel list files, directories or glob patterns
    #[arg(
        short,
        long,
        env = "LIVEKEEP_SRC",
        required = true,
        num_args = 1..,
        value_delimiter = ' '
    )]
    pub src: Vec<String>,

    /// Proxies handed out round-robin to probes and recorders
    #[arg(short, long, env = "LIVEKEEP_PROXIES", num_args = 1.., value_delimiter = ' ')]
    pub proxy: Vec<String>,

    /// Netscape cookie file for yt-dlp, ytarchive and the chat recorder
    #[arg(short, long, env = "LIVEKEEP_COOKIES")]
    pub cookies: Option<PathBuf>,

    /// ntfy topic name or full topic URL for online/offline notifications
    #[arg(long, env = "LIVEKEEP_NTFY")]
    pub ntfy: Option<String>,

    /// Media recorder: streamlink, yt-dlp or ytarchive
    #[arg(long, env = "LIVEKEEP_METHOD", default_value = "streamlink")]
    pub method: MethodKind,

    /// bgutil PO token provider URL, for yt-dlp and ytarchive on YouTube
    #[arg(short, long, env = "LIVEKEEP_BGUTIL", default_value = DEFAULT_POT_PROVIDER)]
    pub bgutil: String,

    /// Maximum number of liveness probes running at once
    #[arg(long, env = "LIVEKEEP_PROBE_CONCURRENCY", default_value_t = 4)]
    pub probe_concurrency: usize,

    /// Treat `<channel>` and `<channel>/live` as different YouTube channels
    #[arg(long)]
    pub keep_live_suffix: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub debug: bool,

    /// Trace logging
    #[arg(long)]
    pub trace: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.trace {
            "trace"
        } else if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            strip_live_suffix: !self.keep_live_suffix,
            ..UrlPolicy::default()
        }
    }

    pub fn probe_concurrency(&self) -> usize {
        self.probe_concurrency.max(1)
    }
}

/// Build the capture method for `kind`, with extra tool arguments taken
/// from the `LIVEKEEP_ARGS_*` variables.
pub fn capture_method(kind: MethodKind) -> CaptureMethod {
    let env = |key: &str| std::env::var(key).ok();
    method_from(kind, env(ENV_ARGS_STREAMLINK), env(ENV_ARGS_YTDLP), env(ENV_ARGS_YTARCHIVE))
}

fn method_from(
    kind: MethodKind,
    streamlink: Option<String>,
    ytdlp: Option<String>,
    ytarchive: Option<String>,
) -> CaptureMethod {
    let streamlink = StreamlinkArgs {
        extra: extra_args(ENV_ARGS_STREAMLINK, streamlink),
    };
    match kind {
        MethodKind::Streamlink => CaptureMethod::Streamlink(streamlink),
        MethodKind::YtDlp => CaptureMethod::YtDlp(YtDlpArgs {
            extra: extra_args(ENV_ARGS_YTDLP, ytdlp),
        }),
        MethodKind::YtArchive => CaptureMethod::YtArchive(YtArchiveArgs {
            extra: extra_args(ENV_ARGS_YTARCHIVE, ytarchive),
            fallback: streamlink,
        }),
    }
}

fn extra_args(var: &str, value: Option<String>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    shell_words::split(&value).unwrap_or_else(|e| {
        tracing::warn!("{var} is not a valid argument list ({e}), ignoring it");
        Vec::new()
    })
}
