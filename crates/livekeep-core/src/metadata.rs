//! Stream metadata as reported by the metadata resolver, and the per-site
//! choice of which fields name a session.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::CoreError;

/// YouTube appends ` YYYY-MM-DD HH:MM` to live titles.
static YOUTUBE_TITLE_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+\d{4}-\d{2}-\d{2} \d{2}:\d{2}$").expect("static pattern compiles")
});

#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub extractor: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub fulltitle: Option<String>,
    pub uploader: Option<String>,
    pub description: Option<String>,
    pub webpage_url: Option<String>,
    pub webpage_url_basename: Option<String>,
    pub release_timestamp: Option<i64>,
    /// Full resolver document, persisted as the session's `.info` file.
    pub raw: Value,
}

impl StreamMetadata {
    pub fn from_json(raw: Value) -> Result<Self, CoreError> {
        let obj = raw.as_object().ok_or(CoreError::NotAnObject)?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        let extractor = text("extractor").ok_or(CoreError::MissingField("extractor"))?;
        let release_timestamp = obj.get("release_timestamp").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });

        Ok(Self {
            id: text("id"),
            title: text("title"),
            fulltitle: text("fulltitle"),
            uploader: text("uploader"),
            description: text("description"),
            webpage_url: text("webpage_url"),
            webpage_url_basename: text("webpage_url_basename"),
            release_timestamp,
            extractor,
            raw,
        })
    }

    pub fn is_youtube(&self) -> bool {
        self.extractor.contains("youtube")
    }

    /// Title used for naming and notifications.
    pub fn display_title(&self) -> String {
        let title = match self.extractor.as_str() {
            "youtube" => self
                .title
                .as_deref()
                .map(|t| YOUTUBE_TITLE_STAMP.replace(t, "").into_owned()),
            "twitch:stream" => self.description.clone(),
            "wasdtv:stream" => self.fulltitle.clone(),
            _ => self.title.clone(),
        };
        title.unwrap_or_default()
    }

    /// Channel/user name used for naming and notifications.
    pub fn display_user(&self) -> String {
        let user = match self.extractor.as_str() {
            "wasdtv:stream" => self.webpage_url_basename.clone(),
            _ => self.uploader.clone(),
        };
        user.unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    /// Page URL for the chat recorder and notifications.
    pub fn page_url<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.webpage_url.as_deref().unwrap_or(fallback)
    }

    pub fn released_at(&self) -> Option<DateTime<Utc>> {
        self.release_timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }
}
