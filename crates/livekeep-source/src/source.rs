//! Channel lists: input expansion, change tracking, reconciliation.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use livekeep_core::{ChannelDescriptor, UrlPolicy};
use toml::Table;

use crate::entry::parse_entries;
use crate::error::SourceError;

/// Result of one [`ChannelSource::resolve`].
#[derive(Debug)]
pub struct Resolved {
    /// Deduplicated by key, first occurrence wins.
    pub channels: Vec<ChannelDescriptor>,
    /// The set of files or any modification time differs from the previous
    /// resolve. Always true on the first resolve.
    pub changed: bool,
}

/// Every input file with its modification time, in expansion order.
type Fingerprint = Vec<(PathBuf, Option<SystemTime>)>;

pub struct ChannelSource {
    inputs: Vec<String>,
    policy: UrlPolicy,
    last: Option<Fingerprint>,
}

impl ChannelSource {
    /// `inputs` are file paths, directories (expanded to their `*.toml`
    /// files) or glob patterns.
    pub fn new(inputs: Vec<String>, policy: UrlPolicy) -> Self {
        Self {
            inputs,
            policy,
            last: None,
        }
    }

    /// Read and reconcile all channel lists.
    pub fn resolve(&mut self) -> Result<Resolved, SourceError> {
        let files = self.expand(true);
        let fingerprint = fingerprint(&files);
        let changed = self.last.as_ref() != Some(&fingerprint);
        self.last = Some(fingerprint);

        let mut channels = Vec::new();
        let mut seen = HashSet::new();
        let mut usable = 0usize;

        for file in &files {
            let table = match load(file) {
                Ok(table) => table,
                Err(e) => {
                    tracing::error!("{e}");
                    continue;
                }
            };
            usable += 1;
            for channel in parse_entries(file, &table, &self.policy) {
                if seen.insert(channel.key.clone()) {
                    channels.push(channel);
                } else {
                    tracing::debug!(
                        file = %file.display(),
                        entry = %channel.name,
                        channel = %channel.key,
                        "duplicate channel, keeping the first"
                    );
                }
            }
        }

        if usable == 0 {
            return Err(SourceError::NoUsableSources {
                inputs: self.inputs.len(),
            });
        }
        tracing::trace!(files = usable, channels = channels.len(), changed, "channel lists resolved");
        Ok(Resolved { channels, changed })
    }

    /// Whether any input changed since the last [`resolve`](Self::resolve),
    /// without parsing. False before the first resolve.
    pub fn has_changed(&self) -> bool {
        self.last
            .as_ref()
            .is_some_and(|last| *last != fingerprint(&self.expand(false)))
    }

    /// Drop a remove-on-capture entry from its list file. The file's
    /// modification time is restored afterwards, so the rewrite is not seen
    /// as a change. Returns whether an entry was removed.
    pub fn remove_entry(&self, channel: &ChannelDescriptor) -> Result<bool, SourceError> {
        if !channel.remove_on_capture {
            return Ok(false);
        }
        let path = channel.origin.as_path();
        let mut table = load(path)?;
        if table.remove(&channel.name).is_none() {
            return Ok(false);
        }

        let write_err = |source: std::io::Error| SourceError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(write_err)?;
        std::fs::write(path, toml::to_string(&table)?).map_err(write_err)?;
        File::options()
            .write(true)
            .open(path)
            .and_then(|f| f.set_modified(mtime))
            .map_err(write_err)?;

        tracing::warn!(file = %path.display(), entry = %channel.name, "removed entry");
        Ok(true)
    }

    fn expand(&self, log: bool) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for input in &self.inputs {
            let path = Path::new(input);
            if path.is_file() {
                if !files.iter().any(|f| f == path) {
                    files.push(path.to_path_buf());
                }
                continue;
            }
            let pattern = if path.is_dir() {
                format!("{}/*.toml", glob::Pattern::escape(input.trim_end_matches('/')))
            } else {
                input.clone()
            };
            let matches = match glob::glob(&pattern) {
                Ok(paths) => paths.filter_map(Result::ok).filter(|p| p.is_file()).collect::<Vec<_>>(),
                Err(e) => {
                    if log {
                        tracing::error!(input = %input, "invalid input pattern: {e}");
                    }
                    continue;
                }
            };
            if matches.is_empty() && log {
                tracing::error!(input = %input, "no channel list found");
            }
            for file in matches {
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }
        files
    }
}

fn fingerprint(files: &[PathBuf]) -> Fingerprint {
    files
        .iter()
        .map(|f| {
            let mtime = std::fs::metadata(f).and_then(|m| m.modified()).ok();
            (f.clone(), mtime)
        })
        .collect()
}

fn load(path: &Path) -> Result<Table, SourceError> {
    let text = std::fs::read_to_string(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table: Table = text.parse().map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    if table.is_empty() {
        return Err(SourceError::Empty(path.to_path_buf()));
    }
    Ok(table)
}
