//! tracing subscriber setup: stderr plus an optional plain-text log file.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the global subscriber. The filter comes from `LIVEKEEP_LOG_LEVEL`
/// or `RUST_LOG`, else `default_level`.
pub fn init(default_level: &str, log: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let filter = std::env::var("LIVEKEEP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, path) = match log {
        Some(log) => {
            let path = log_file_path(log, chrono::Local::now().date_naive());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(stderr)
        .with(file_layer)
        .try_init()
        .context("logging already initialized")?;
    Ok(path)
}

/// A directory means one file per day inside it.
fn log_file_path(log: &Path, today: NaiveDate) -> PathBuf {
    if log.is_dir() {
        log.join(format!("{}.log", today.format("%Y-%m-%d")))
    } else {
        log.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_gets_dated_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        assert_eq!(log_file_path(dir.path(), day), dir.path().join("2024-03-09.log"));
    }

    #[test]
    fn file_path_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("livekeep.log");
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).expect("date");
        assert_eq!(log_file_path(&file, day), file);
    }
}
