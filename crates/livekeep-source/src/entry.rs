//! One channel list file → channel descriptors.
//!
//! Every top-level table is an entry. The table name is free-form unless the
//! entry has no `url`, in which case the name itself may be the URL:
//!
//! ```toml
//! [somechannel]
//! url = "https://www.twitch.tv/somechannel"
//! quality = "720p"
//! regex_title = "karaoke"
//!
//! ["https://www.youtube.com/@other"]      # name is the URL
//! ["!https://www.youtube.com/watch?v=x"]  # captured once, then removed
//! ["@https://kick.com/someone"]            # health check only
//! ```

use std::path::Path;

use livekeep_core::{ChannelDescriptor, ContentFilter, UrlPolicy, is_http_url};
use toml::{Table, Value};

/// Parse every entry of one file. Invalid entries are logged and skipped.
pub fn parse_entries(origin: &Path, table: &Table, policy: &UrlPolicy) -> Vec<ChannelDescriptor> {
    let mut out = Vec::with_capacity(table.len());
    for (name, value) in table {
        let Some(fields) = value.as_table() else {
            tracing::warn!(file = %origin.display(), entry = %name, "entry is not a table, skipping");
            continue;
        };
        match parse_entry(origin, name, fields, policy) {
            Ok(channel) => out.push(channel),
            Err(Skip::Quiet(reason)) => {
                tracing::trace!(file = %origin.display(), entry = %name, "{reason}, skipping");
            }
            Err(Skip::Warn(reason)) => {
                tracing::warn!(file = %origin.display(), entry = %name, "{reason}, skipping");
            }
        }
    }
    out
}

enum Skip {
    Quiet(String),
    Warn(String),
}

fn parse_entry(
    origin: &Path,
    name: &str,
    fields: &Table,
    policy: &UrlPolicy,
) -> Result<ChannelDescriptor, Skip> {
    let mut delete = flag(fields, &["delete", "d"]);
    let mut health = flag(fields, &["health"]);

    let url = match string(fields, &["url", "u"]) {
        Some(url) => url.to_string(),
        None => match shortcut(name) {
            Some(Shortcut::Url(url)) => url.to_string(),
            Some(Shortcut::Delete(url)) => {
                delete = true;
                url.to_string()
            }
            Some(Shortcut::Health(url)) => {
                health = true;
                url.to_string()
            }
            None => String::new(),
        },
    };

    if url.trim().is_empty() {
        return Err(Skip::Quiet("empty url".into()));
    }
    if !is_http_url(&url) {
        return Err(Skip::Warn(format!("{url:?} is not a valid url")));
    }

    let any = string(fields, &["regex", "r"]);
    let filter = ContentFilter::new(
        any,
        string(fields, &["regex_title"]),
        string(fields, &["regex_desc"]),
    )
    .map_err(|e| Skip::Warn(e.to_string()))?;

    let mut channel = ChannelDescriptor::new(name, origin, &url, policy)
        .with_filter(filter)
        .remove_on_capture(delete)
        .health_check(health);
    if let Some(quality) = string(fields, &["quality", "q"]) {
        channel = channel.with_quality(quality);
    }
    if let Some(folder) = string(fields, &["folder", "f"]) {
        channel = channel.with_folder(folder);
    }
    Ok(channel)
}

enum Shortcut<'a> {
    Url(&'a str),
    Delete(&'a str),
    Health(&'a str),
}

fn shortcut(name: &str) -> Option<Shortcut<'_>> {
    if is_http_url(name) {
        return Some(Shortcut::Url(name));
    }
    if let Some(url) = name.strip_prefix('!').filter(|u| is_http_url(u)) {
        return Some(Shortcut::Delete(url));
    }
    if let Some(url) = name.strip_prefix('@').filter(|u| is_http_url(u)) {
        return Some(Shortcut::Health(url));
    }
    None
}

/// First non-empty string among the key aliases.
fn string<'a>(fields: &'a Table, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn flag(fields: &Table, keys: &[&str]) -> bool {
    keys.iter().any(|k| match fields.get(*k) {
        Some(Value::Boolean(b)) => *b,
        Some(Value::Integer(i)) => *i != 0,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<ChannelDescriptor> {
        let table: Table = src.parse().expect("valid toml");
        parse_entries(Path::new("list.toml"), &table, &UrlPolicy::default())
    }

    #[test]
    fn long_and_short_keys() {
        let channels = parse(
            r#"
            [a]
            url = "https://www.twitch.tv/a"
            quality = "720p"
            folder = "music"
            delete = true

            [b]
            u = "https://www.twitch.tv/b"
            q = "480p"
            f = "talk"
            d = true
            "#,
        );
        assert_eq!(channels.len(), 2);
        for (c, quality, folder) in [(&channels[0], "720p", "music"), (&channels[1], "480p", "talk")] {
            assert_eq!(c.quality, quality);
            assert_eq!(c.folder, folder);
            assert!(c.remove_on_capture);
            assert!(!c.health_check);
        }
        assert_eq!(channels[0].name, "a");
        assert_eq!(channels[0].origin, Path::new("list.toml"));
    }

    #[test]
    fn defaults() {
        let channels = parse("[a]\nurl = \"https://www.twitch.tv/a\"\n");
        assert_eq!(channels[0].quality, "best");
        assert_eq!(channels[0].folder, "");
        assert!(channels[0].filter.is_empty());
        assert!(!channels[0].remove_on_capture);
    }

    #[test]
    fn name_shortcuts() {
        let channels = parse(
            r#"
            ["https://www.twitch.tv/plain"]
            ["!https://www.twitch.tv/once"]
            ["@https://www.twitch.tv/health"]
            "#,
        );
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[0].url, "https://www.twitch.tv/plain");
        assert!(!channels[0].remove_on_capture && !channels[0].health_check);
        assert_eq!(channels[1].url, "https://www.twitch.tv/once");
        assert_eq!(channels[1].name, "!https://www.twitch.tv/once");
        assert!(channels[1].remove_on_capture);
        assert_eq!(channels[2].url, "https://www.twitch.tv/health");
        assert!(channels[2].health_check);
    }

    #[test]
    fn explicit_url_wins_over_name() {
        let channels = parse(
            r#"
            ["https://www.twitch.tv/name"]
            url = "https://www.twitch.tv/field"
            "#,
        );
        assert_eq!(channels[0].url, "https://www.twitch.tv/field");
    }

    #[test]
    fn invalid_entries_skipped() {
        let channels = parse(
            r#"
            [empty]
            quality = "best"

            [not_http]
            url = "ftp://example.com/x"

            [bad_regex]
            url = "https://www.twitch.tv/x"
            regex = "("

            [valid]
            url = "https://www.twitch.tv/ok"
            "#,
        );
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "valid");
    }

    #[test]
    fn non_table_values_skipped() {
        let channels = parse("top = 1\n[a]\nurl = \"https://www.twitch.tv/a\"\n");
        assert_eq!(channels.len(), 1);
    }

    #[test]
    fn filter_keys() {
        let channels = parse(
            r#"
            [a]
            url = "https://www.twitch.tv/a"
            r = "karaoke"

            [b]
            url = "https://www.twitch.tv/b"
            regex_title = "^unarchived"
            regex_desc = "members"
            "#,
        );
        assert!(channels[0].filter.matches("Sunday KARAOKE", ""));
        assert!(channels[0].filter.matches("chat", "karaoke later"));
        assert!(!channels[0].filter.matches("chat", "games"));

        assert!(channels[1].filter.matches("Unarchived stream", "members only"));
        assert!(channels[1].filter.matches("Unarchived stream", ""));
        assert!(!channels[1].filter.matches("stream", "members only"));
    }

    #[test]
    fn flag_forms() {
        let channels = parse(
            r#"
            [a]
            url = "https://www.twitch.tv/a"
            delete = 1
            [b]
            url = "https://www.twitch.tv/b"
            health = "yes"
            [c]
            url = "https://www.twitch.tv/c"
            delete = false
            "#,
        );
        assert!(channels[0].remove_on_capture);
        assert!(channels[1].health_check);
        assert!(!channels[2].remove_on_capture);
    }
}
