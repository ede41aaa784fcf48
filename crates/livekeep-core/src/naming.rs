//! Session directory and file naming.
//!
//! A session lives in `<output>/<folder>/[live] <stem>` while it is being
//! captured and is renamed to `<output>/<folder>/<stem>` once finalized. The
//! stem is `[<yy-mm-dd HH_MM_SS>] <user> - <title>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::sanitize::{MAX_NAME_BYTES, sanitize_component, sanitize_field, truncate_bytes};

/// Prefix marking a directory whose capture is still running.
pub const LIVE_PREFIX: &str = "[live] ";

const STAMP_FORMAT: &str = "%y-%m-%d %H_%M_%S";
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionName {
    stem: String,
    folder: String,
}

impl SessionName {
    /// Build a session name. `user`, `title` and `folder` are sanitized here.
    pub fn new(started: NaiveDateTime, user: &str, title: &str, folder: &str) -> Self {
        let user = non_empty(sanitize_field(user));
        let title = non_empty(sanitize_field(title));
        let stem = format!("[{}] {user} - {title}", started.format(STAMP_FORMAT));
        let stem = truncate_bytes(&stem, MAX_NAME_BYTES)
            .trim_end_matches([' ', '.'])
            .to_string();
        Self {
            stem,
            folder: sanitize_component(folder),
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Directory holding the session while it is live.
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        self.parent(root).join(format!("{LIVE_PREFIX}{}", self.stem))
    }

    /// Directory name after finalize.
    pub fn final_dir(&self, root: &Path) -> PathBuf {
        self.parent(root).join(&self.stem)
    }

    /// `<dir>/<stem>.<ext>`
    pub fn file(&self, dir: &Path, ext: &str) -> PathBuf {
        dir.join(format!("{}.{ext}", self.stem))
    }

    /// `<dir>/<stem>` without extension, for tools that add their own.
    pub fn base(&self, dir: &Path) -> PathBuf {
        dir.join(&self.stem)
    }

    fn parent(&self, root: &Path) -> PathBuf {
        if self.folder.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&self.folder)
        }
    }
}

fn non_empty(s: String) -> String {
    if s.is_empty() { UNKNOWN.to_string() } else { s }
}

/// `H:MM:SS`, whole seconds.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(21, 3, 9))
            .expect("valid date")
    }

    #[test]
    fn stem_format() {
        let name = SessionName::new(stamp(), "Some User", "Karaoke: night 2/3", "");
        assert_eq!(name.stem(), "[24-05-01 21_03_09] Some User - Karaoke_ night 2_3");
    }

    #[test]
    fn live_and_final_dirs() {
        let name = SessionName::new(stamp(), "u", "t", "");
        let root = Path::new("/out");
        assert_eq!(
            name.working_dir(root),
            PathBuf::from("/out/[live] [24-05-01 21_03_09] u - t")
        );
        assert_eq!(
            name.final_dir(root),
            PathBuf::from("/out/[24-05-01 21_03_09] u - t")
        );
    }

    #[test]
    fn folder_is_sanitized_into_single_component() {
        let name = SessionName::new(stamp(), "u", "t", "../vtubers/en");
        let dir = name.final_dir(Path::new("/out"));
        assert_eq!(dir.parent(), Some(Path::new("/out/.._vtubers_en")));
    }

    #[test]
    fn empty_fields_fall_back_to_unknown() {
        let name = SessionName::new(stamp(), "  ", "???", "");
        assert_eq!(name.stem(), "[24-05-01 21_03_09] unknown - _");
    }

    #[test]
    fn stem_is_bounded() {
        let name = SessionName::new(stamp(), &"u".repeat(300), &"t".repeat(300), "");
        assert!(name.stem().len() <= MAX_NAME_BYTES);
    }

    #[test]
    fn file_paths() {
        let name = SessionName::new(stamp(), "u", "t", "");
        let dir = Path::new("/d");
        assert_eq!(name.file(dir, "info"), PathBuf::from("/d/[24-05-01 21_03_09] u - t.info"));
        assert_eq!(name.base(dir), PathBuf::from("/d/[24-05-01 21_03_09] u - t"));
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1:02:03");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "0:00:59");
    }
}
