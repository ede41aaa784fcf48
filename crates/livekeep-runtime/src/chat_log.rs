//! Readable chat transcript (`<stem>.conv`) built from the chat recorder's
//! JSON output.
//!
//! The transcript has three parts: a message/user count box, a user table
//! (privileged users first), and the message list with offsets relative to
//! the first message.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

const NULL: &str = "__NULL__";
const CUT_MARK: &str = "~1";
const MESSAGE_USER_CHARS: usize = 20;
const TABLE_USER_CHARS: usize = 30;

const VERIFIED: &[&str] = &["Verified", "Подтверждено"];
const MODERATOR: &[&str] = &["Moderator", "Модератор"];
const OWNER: &[&str] = &["Owner", "Владелец"];
const SPONSOR: &[&str] = &["Sponsor", "Спонсор"];
const MEMBER: &[&str] = &["sponsor", "спонсор"];

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat log io: {0}")]
    Io(#[from] std::io::Error),

    #[error("chat log is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chat log is not a json array")]
    NotArray,

    #[error("no youtube or twitch messages (action types: {0})")]
    UnknownSite(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatSummary {
    pub messages: usize,
    pub users: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    YouTube,
    Twitch,
}

impl Site {
    fn detect(items: &[Value]) -> Result<Self, ChatError> {
        let mut types: Vec<&str> = items
            .iter()
            .filter_map(|i| i.get("action_type")?.as_str())
            .collect();
        types.sort_unstable();
        types.dedup();
        if types.contains(&"add_chat_item") {
            Ok(Self::YouTube)
        } else if types.contains(&"text_message") {
            Ok(Self::Twitch)
        } else {
            Err(ChatError::UnknownSite(types.join(", ")))
        }
    }

    fn channel_link(self) -> &'static str {
        match self {
            Self::YouTube => "https://www.youtube.com/channel/",
            Self::Twitch => "https://www.twitch.tv/",
        }
    }
}

/// Convert `<stem>.json` into `<stem>.conv` next to it. `Ok(None)` when the
/// chat recorder produced no file.
pub fn convert(json_path: &Path) -> Result<Option<(PathBuf, ChatSummary)>, ChatError> {
    if !json_path.is_file() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(&std::fs::read_to_string(json_path)?)?;
    let items = value.as_array().ok_or(ChatError::NotArray)?;
    let (text, summary) = render(items)?;
    let conv = json_path.with_extension("conv");
    std::fs::write(&conv, text)?;
    Ok(Some((conv, summary)))
}

struct UserRow {
    badges: String,
    username: String,
    count: usize,
    link: String,
}

impl UserRow {
    /// Owners, then moderators, verified, sponsors, members; lower sorts first.
    fn rank(&self) -> [bool; 5] {
        [OWNER, MODERATOR, VERIFIED, SPONSOR, MEMBER].map(|names| !contains_any(&self.badges, names))
    }
}

fn render(items: &[Value]) -> Result<(String, ChatSummary), ChatError> {
    let site = Site::detect(items)?;

    let mut users: Vec<UserRow> = Vec::new();
    let mut user_index: HashMap<String, usize> = HashMap::new();
    let mut lines: Vec<Vec<String>> = Vec::new();
    let mut first_ts: Option<i64> = None;

    for item in items {
        let Some(message) = item.get("message") else {
            continue;
        };
        let message = match message {
            Value::String(s) if !s.is_empty() => s.replace(['\r', '\n'], " "),
            Value::String(_) | Value::Null => NULL.to_string(),
            other => other.to_string(),
        };
        let author = item.get("author").unwrap_or(&Value::Null);
        let badges = badges(author);

        let username = match site {
            Site::YouTube => text(author, "name").map(|n| n.trim_start_matches('@')),
            Site::Twitch => text(author, "display_name"),
        }
        .unwrap_or(NULL)
        .to_string();

        let ts = timestamp(item);
        let base = *first_ts.get_or_insert(ts);
        lines.push(vec![
            format_offset(ts - base),
            role_icon(&badges),
            cut(&username, MESSAGE_USER_CHARS),
            message,
        ]);

        let uid = match site {
            Site::YouTube => text(author, "id"),
            Site::Twitch => text(author, "name"),
        }
        .unwrap_or(&username)
        .to_string();
        match user_index.get(&uid) {
            Some(&i) => users[i].count += 1,
            None => {
                user_index.insert(uid.clone(), users.len());
                users.push(UserRow {
                    link: format!("{}{uid}", site.channel_link()),
                    badges,
                    username: cut(&username, TABLE_USER_CHARS),
                    count: 1,
                });
            }
        }
    }

    users.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.username.cmp(&b.username)));

    let summary = ChatSummary {
        messages: items.len(),
        users: users.len(),
    };

    let mut out = outline(
        &["messages", "users"],
        &[vec![summary.messages.to_string(), summary.users.to_string()]],
        &[Align::Center, Align::Center],
    );
    let user_rows: Vec<Vec<String>> = users
        .into_iter()
        .map(|u| {
            let count = if u.count > 1 { u.count.to_string() } else { String::new() };
            vec![u.badges, u.username, count, u.link]
        })
        .collect();
    out.push_str(&outline(
        &["Badges", "Username", "len", "Link to channel (id)"],
        &user_rows,
        &[Align::Left; 4],
    ));
    out.push_str(&plain(&lines, &[Align::Left, Align::Right, Align::Right, Align::Left]));
    Ok((out, summary))
}

fn text<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Microseconds since the epoch. Some recorders write floats.
fn timestamp(item: &Value) -> i64 {
    match item.get("timestamp") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        _ => 0,
    }
}

fn badges(author: &Value) -> String {
    let Some(list) = author.get("badges").and_then(Value::as_array) else {
        return String::new();
    };
    list.iter()
        .map(|b| text(b, "title").or_else(|| text(b, "name")).unwrap_or(NULL))
        .collect::<Vec<_>>()
        .join(", ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn role_icon(badges: &str) -> String {
    let mut icon = String::new();
    for (names, mark) in [(VERIFIED, '✔'), (MODERATOR, 'M'), (OWNER, 'O')] {
        if contains_any(badges, names) {
            icon.push(mark);
        }
    }
    icon
}

fn cut(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}{CUT_MARK}", &s[..i]),
        None => s.to_string(),
    }
}

/// `H:MM:SS.mmm`; negative offsets (out-of-order timestamps) clamp to zero.
fn format_offset(micros: i64) -> String {
    let millis = micros.max(0) / 1_000;
    let secs = millis / 1_000;
    format!(
        "{}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis % 1_000
    )
}

// ─── Tables ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

fn width(s: &str) -> usize {
    s.chars().count()
}

fn pad(s: &str, w: usize, align: Align) -> String {
    let fill = w.saturating_sub(width(s));
    match align {
        Align::Left => format!("{s}{}", " ".repeat(fill)),
        Align::Right => format!("{}{s}", " ".repeat(fill)),
        Align::Center => {
            let left = fill / 2;
            format!("{}{s}{}", " ".repeat(left), " ".repeat(fill - left))
        }
    }
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let cols = headers.len().max(rows.iter().map(Vec::len).max().unwrap_or(0));
    (0..cols)
        .map(|c| {
            let head = headers.get(c).map_or(0, |h| width(h));
            rows.iter()
                .filter_map(|r| r.get(c))
                .map(|cell| width(cell))
                .fold(head, usize::max)
        })
        .collect()
}

fn outline(headers: &[&str], rows: &[Vec<String>], align: &[Align]) -> String {
    let widths = column_widths(headers, rows);
    let rule = |l: &str, m: &str, r: &str| {
        let segs: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{l}{}{r}\n", segs.join(m))
    };
    let line = |cells: Vec<&str>| {
        let segs: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let cell = cells.get(i).copied().unwrap_or("");
                format!(" {} ", pad(cell, *w, align.get(i).copied().unwrap_or(Align::Left)))
            })
            .collect();
        format!("│{}│\n", segs.join("│"))
    };

    let mut out = rule("┌", "┬", "┐");
    out.push_str(&line(headers.to_vec()));
    out.push_str(&rule("├", "┼", "┤"));
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out.push_str(&rule("└", "┴", "┘"));
    out
}

fn plain(rows: &[Vec<String>], align: &[Align]) -> String {
    let widths = column_widths(&[], rows);
    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad(cell, widths[i], align.get(i).copied().unwrap_or(Align::Left)))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn youtube_chat() -> Value {
        json!([
            {
                "action_type": "add_chat_item",
                "message": "hello",
                "timestamp": 1_700_000_000_000_000i64,
                "author": {"name": "@viewer", "id": "UC1"}
            },
            {
                "action_type": "add_chat_item",
                "message": "welcome",
                "timestamp": 1_700_000_061_500_000i64,
                "author": {"name": "Chan", "id": "UC0", "badges": [{"title": "Owner"}]}
            },
            {
                "action_type": "add_chat_item",
                "message": "again",
                "timestamp": 1_700_000_062_000_000i64,
                "author": {"name": "@viewer", "id": "UC1"}
            },
            {
                "action_type": "add_chat_item",
                "message": "rules",
                "timestamp": 1_700_003_662_000_000i64,
                "author": {"name": "Mod", "id": "UC2", "badges": [{"title": "Moderator"}, {"title": "Verified"}]}
            },
            {"action_type": "ticker_paid_message_item", "timestamp": 1_700_003_700_000_000i64}
        ])
    }

    #[test]
    fn youtube_transcript() {
        let chat = youtube_chat();
        let (text, summary) = render(chat.as_array().expect("array")).expect("render");
        assert_eq!(summary, ChatSummary { messages: 5, users: 3 });

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[1].contains("messages") && lines[1].contains("users"));
        assert!(lines[3].contains('5') && lines[3].contains('3'));

        // Owner first, then moderator, then everyone else.
        let owner = text.find("UC0").expect("owner row");
        let moderator = text.find("UC2").expect("moderator row");
        let viewer = text.find("UC1").expect("viewer row");
        assert!(owner < moderator && moderator < viewer);
        assert!(text.contains("https://www.youtube.com/channel/UC1"));

        let messages: Vec<&str> = lines.iter().rev().take(4).rev().copied().collect();
        assert!(messages[0].starts_with("0:00:00.000") && messages[0].ends_with("hello"));
        assert!(messages[1].starts_with("0:01:01.500") && messages[1].contains("O"));
        assert!(messages[3].starts_with("1:01:02.000") && messages[3].contains("✔M"));
        assert!(!messages[0].contains('@'));
    }

    #[test]
    fn twitch_transcript() {
        let chat = json!([
            {
                "action_type": "text_message",
                "message": "hi",
                "timestamp": 1_000_000,
                "author": {"name": "someone", "display_name": "SomeOne"}
            },
            {
                "action_type": "text_message",
                "message": "",
                "timestamp": 3_000_000,
                "author": {"name": "someone", "display_name": "SomeOne"}
            }
        ]);
        let (text, summary) = render(chat.as_array().expect("array")).expect("render");
        assert_eq!(summary.users, 1);
        assert!(text.contains("https://www.twitch.tv/someone"));
        assert!(text.contains("SomeOne"));
        assert!(text.lines().last().is_some_and(|l| l.starts_with("0:00:02.000") && l.ends_with(NULL)));
    }

    #[test]
    fn unknown_site_is_an_error() {
        let chat = json!([{"action_type": "something_else", "message": "x"}]);
        assert!(matches!(
            render(chat.as_array().expect("array")),
            Err(ChatError::UnknownSite(_))
        ));
    }

    #[test]
    fn long_names_are_cut() {
        assert_eq!(cut("abcdef", 3), "abc~1");
        assert_eq!(cut("abc", 3), "abc");
        assert_eq!(cut("ёжикёжик", 4), "ёжик~1");
    }

    #[test]
    fn role_icons() {
        assert_eq!(role_icon("Owner"), "O");
        assert_eq!(role_icon("Модератор, Подтверждено"), "✔M");
        assert_eq!(role_icon("Member (1 year)"), "");
    }

    #[test]
    fn offsets_clamp_negative() {
        assert_eq!(format_offset(-5), "0:00:00.000");
        assert_eq!(format_offset(3_723_004_000), "1:02:03.004");
    }

    #[test]
    fn outline_box_shape() {
        let text = outline(&["a", "bb"], &[vec!["1".into(), "2".into()]], &[Align::Left, Align::Right]);
        assert_eq!(
            text,
            "┌───┬────┐\n│ a │ bb │\n├───┼────┤\n│ 1 │  2 │\n└───┴────┘\n"
        );
    }

    #[test]
    fn convert_writes_conv_next_to_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json_path = dir.path().join("[24-01-01 00_00_00] a - b.json");
        std::fs::write(&json_path, youtube_chat().to_string()).expect("write");
        let (conv, summary) = convert(&json_path).expect("convert").expect("written");
        assert_eq!(conv, dir.path().join("[24-01-01 00_00_00] a - b.conv"));
        assert_eq!(summary.messages, 5);
        assert!(conv.is_file());
    }

    #[test]
    fn missing_json_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(convert(&dir.path().join("none.json")).expect("convert").is_none());
    }

    #[test]
    fn non_array_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json_path = dir.path().join("x.json");
        std::fs::write(&json_path, "{}").expect("write");
        assert!(matches!(convert(&json_path), Err(ChatError::NotArray)));
    }
}
