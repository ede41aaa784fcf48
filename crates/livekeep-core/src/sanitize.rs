//! Filesystem-safe names built from stream metadata.
//!
//! Uploader names and titles end up as directory and file names, so every
//! character that is reserved on common filesystems is replaced and the
//! length is bounded.

/// Maximum characters kept from a single metadata field (user, title, folder).
pub const MAX_FIELD_CHARS: usize = 100;

/// Maximum bytes of a session stem. Leaves room for the `[live] ` prefix and
/// file extensions under the usual 255-byte component limit.
pub const MAX_NAME_BYTES: usize = 200;

const REPLACEMENT: char = '_';
const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace reserved and control characters, collapse runs of whitespace and
/// replacement characters, and trim trailing dots and spaces. Idempotent.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        let mapped = if ch.is_whitespace() {
            ' '
        } else if ch.is_control() || RESERVED.contains(&ch) {
            REPLACEMENT
        } else {
            ch
        };
        let last = out.chars().next_back();
        if (mapped == ' ' || mapped == REPLACEMENT) && last == Some(mapped) {
            continue;
        }
        out.push(mapped);
    }
    trim_edges(&out).to_string()
}

/// [`sanitize_component`] bounded to [`MAX_FIELD_CHARS`] characters.
pub fn sanitize_field(raw: &str) -> String {
    let clean = sanitize_component(raw);
    let bounded: String = clean.chars().take(MAX_FIELD_CHARS).collect();
    trim_edges(&bounded).to_string()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn trim_edges(s: &str) -> &str {
    s.trim_start_matches(' ').trim_end_matches([' ', '.'])
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_has_no_reserved_or_control_chars(raw in "\\PC*|[\\x00-\\x1f<>:\"/\\\\|?*a-z ]{0,64}") {
            let out = sanitize_field(&raw);
            prop_assert!(!out.chars().any(|c| RESERVED.contains(&c) || c.is_control()));
            prop_assert!(out.chars().count() <= MAX_FIELD_CHARS);
            prop_assert!(!out.ends_with('.') && !out.ends_with(' '));
        }

        #[test]
        fn sanitize_is_idempotent(raw in ".{0,150}") {
            let once = sanitize_field(&raw);
            prop_assert_eq!(sanitize_field(&once), once.clone());
        }
    }
}
