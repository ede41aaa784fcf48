//! Channel identity, URL normalization policy, and per-channel content filters.

use std::fmt;
use std::path::PathBuf;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ─── Identity ─────────────────────────────────────────────────────

/// Canonical identity of a channel: its URL after [`UrlPolicy::normalize`].
///
/// Two descriptors with equal keys are the same channel and must never be
/// captured concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── URL policy ───────────────────────────────────────────────────

/// Rules used to turn a configured URL into a [`ChannelKey`], and into the
/// URL handed to the probe and the capture tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPolicy {
    /// Drop trailing `/` characters from the identity.
    pub strip_trailing_slash: bool,
    /// Drop a trailing `/live` segment from YouTube identities.
    pub strip_live_suffix: bool,
    /// Lowercase scheme and host.
    pub lowercase_host: bool,
    /// Point YouTube channel URLs (not `watch?v=` links) at their `/live` page.
    pub youtube_live_page: bool,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            strip_trailing_slash: true,
            strip_live_suffix: true,
            lowercase_host: true,
            youtube_live_page: true,
        }
    }
}

impl UrlPolicy {
    /// Normalize `url` into a channel identity. Idempotent.
    pub fn normalize(&self, url: &str) -> ChannelKey {
        let mut key = url.trim().to_string();
        if self.lowercase_host {
            key = lowercase_authority(&key);
        }

        let youtube = is_youtube(&key);
        loop {
            let before = key.len();
            if self.strip_trailing_slash {
                let trimmed = key.trim_end_matches('/').len();
                key.truncate(trimmed);
            }
            if self.strip_live_suffix && youtube {
                if let Some(rest) = key.strip_suffix("/live") {
                    let len = rest.len();
                    key.truncate(len);
                }
            }
            if key.len() == before {
                break;
            }
        }

        ChannelKey(key)
    }

    /// URL to probe and capture. YouTube channel pages get `/live` appended
    /// so the tools land on the current broadcast.
    pub fn capture_url(&self, url: &str) -> String {
        let url = url.trim();
        if self.youtube_live_page && is_youtube(url) && !url.contains("watch?v=") {
            let base = url.trim_end_matches('/');
            if !base.ends_with("/live") {
                return format!("{base}/live");
            }
        }
        url.to_string()
    }
}

/// `http://` or `https://` followed by a non-empty host and no whitespace.
pub fn is_http_url(s: &str) -> bool {
    let rest = match s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")) {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    !host.is_empty() && !s.chars().any(char::is_whitespace)
}

fn is_youtube(url: &str) -> bool {
    authority(url).is_some_and(|host| host.to_ascii_lowercase().contains("youtube.com"))
}

fn authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    rest.split(['/', '?', '#']).next()
}

fn lowercase_authority(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);
    format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        host.to_ascii_lowercase(),
        tail
    )
}

// ─── Content filter ───────────────────────────────────────────────

/// Case-insensitive patterns a broadcast must match before it is captured.
///
/// - `any`: title OR description must match.
/// - `title`: title must match.
/// - `description`: description must match, skipped when the stream has none.
///
/// All configured patterns must hold. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    any: Option<Regex>,
    title: Option<Regex>,
    description: Option<Regex>,
}

impl ContentFilter {
    pub fn new(
        any: Option<&str>,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            any: compile(any)?,
            title: compile(title)?,
            description: compile(description)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_none() && self.title.is_none() && self.description.is_none()
    }

    pub fn matches(&self, title: &str, description: &str) -> bool {
        if let Some(re) = &self.any {
            if !re.is_match(title) && !re.is_match(description) {
                return false;
            }
        }
        if let Some(re) = &self.title {
            if !re.is_match(title) {
                return false;
            }
        }
        if let Some(re) = &self.description {
            if !description.is_empty() && !re.is_match(description) {
                return false;
            }
        }
        true
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, CoreError> {
    let Some(pattern) = pattern.filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|source| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

// ─── Descriptor ───────────────────────────────────────────────────

/// One watched channel, as reconciled from the channel lists.
#[derive(Debug, Clone)]
pub struct ChannelDescriptor {
    pub key: ChannelKey,
    /// Entry name inside its list file.
    pub name: String,
    /// List file the entry came from.
    pub origin: PathBuf,
    /// URL as configured.
    pub url: String,
    /// URL handed to the probe, resolver and recorders.
    pub capture_url: String,
    pub quality: String,
    /// Output sub-folder, empty for the output root.
    pub folder: String,
    pub filter: ContentFilter,
    pub remove_on_capture: bool,
    /// Probe only and report failures; never captured.
    pub health_check: bool,
}

impl ChannelDescriptor {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<PathBuf>,
        url: &str,
        policy: &UrlPolicy,
    ) -> Self {
        Self {
            key: policy.normalize(url),
            name: name.into(),
            origin: origin.into(),
            url: url.trim().to_string(),
            capture_url: policy.capture_url(url),
            quality: "best".to_string(),
            folder: String::new(),
            filter: ContentFilter::default(),
            remove_on_capture: false,
            health_check: false,
        }
    }

    #[must_use]
    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn remove_on_capture(mut self, yes: bool) -> Self {
        self.remove_on_capture = yes;
        self
    }

    #[must_use]
    pub fn health_check(mut self, yes: bool) -> Self {
        self.health_check = yes;
        self
    }
}
