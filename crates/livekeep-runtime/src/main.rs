//! livekeep: watch channel lists and record live streams unattended.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use livekeep_core::{CommandBuilder, ProxyPool};
use livekeep_proc::StreamlinkProbe;
use livekeep_proc::handle::DEFAULT_KILL_GRACE;
use livekeep_source::ChannelSource;
use tokio_util::sync::CancellationToken;

mod chat_log;
mod cli;
mod logging;
mod metadata;
mod notify;
mod potoken;
mod preflight;
mod sessions;
mod supervisor;
mod task;
#[cfg(test)]
mod testing;
mod thumbnail;

use metadata::YtDlpResolver;
use notify::{NoopNotifier, Notifier, NtfyNotifier};
use potoken::PoTokenProvider;
use sessions::ActiveSessions;
use supervisor::Supervisor;
use task::TaskEnv;
use thumbnail::ThumbnailFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let log_path = logging::init(args.log_level(), args.log.as_deref())?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log = ?log_path,
        "livekeep starting"
    );

    // Recorders run with the session directory as cwd.
    let output = std::path::absolute(&args.output)
        .with_context(|| format!("invalid output directory {}", args.output.display()))?;
    std::fs::create_dir_all(&output)
        .with_context(|| format!("cannot create output directory {}", output.display()))?;

    let mut source = ChannelSource::new(args.src.clone(), args.url_policy());
    let initial = source.resolve().context("no usable channel list")?;
    if initial.channels.is_empty() {
        bail!("no channels configured in {}", args.src.join(" "));
    }
    tracing::info!(
        channels = initial.channels.len(),
        output = %output.display(),
        delay = args.delay,
        "watching"
    );

    let kind = preflight::run_preflight(args.method).await;
    let method = cli::capture_method(kind);
    let cookies = cookie_file(args.cookies.clone());
    let proxies = Arc::new(ProxyPool::new(args.proxy.clone()));
    let commands = CommandBuilder::new(cookies).with_pot_provider(&args.bgutil);
    let po_tokens = if method.needs_manual_merge() {
        Some(PoTokenProvider::new(&args.bgutil).context("cannot build bgutil client")?)
    } else {
        None
    };

    let notifier: Arc<dyn Notifier> = match args.ntfy.as_deref() {
        Some(topic) => Arc::new(NtfyNotifier::new(topic).context("cannot build ntfy client")?),
        None => Arc::new(NoopNotifier),
    };

    let shutdown = CancellationToken::new();
    let env = Arc::new(TaskEnv {
        output,
        method,
        commands: Arc::new(commands.clone()),
        proxies: Arc::clone(&proxies),
        resolver: Arc::new(YtDlpResolver::new(commands.clone(), Arc::clone(&proxies))),
        notifier,
        thumbnails: Some(ThumbnailFetcher::default()),
        po_tokens,
        sessions: ActiveSessions::new(),
        shutdown: shutdown.clone(),
        poll_interval: task::CAPTURE_POLL,
        kill_grace: DEFAULT_KILL_GRACE,
    });
    let probe = Arc::new(StreamlinkProbe::new(commands, proxies));
    let supervisor = Supervisor::new(
        source,
        probe,
        env,
        Duration::from_secs(args.delay),
        args.probe_concurrency(),
    );

    let signals = tokio::spawn(wait_for_signal(shutdown));
    supervisor.run().await;
    signals.abort();

    tracing::info!("livekeep stopped");
    Ok(())
}

/// Only an existing file is handed to the recorders.
fn cookie_file(path: Option<PathBuf>) -> Option<PathBuf> {
    let path = path?;
    if path.is_file() {
        Some(path)
    } else {
        tracing::warn!(path = %path.display(), "cookie file not found, ignoring");
        None
    }
}

/// Cancel `shutdown` on ctrl-c or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c, shutting down");
    }

    shutdown.cancel();
}
