//! Post-capture merge for recorders that leave separate audio and video
//! files behind together with a mux command file (`*ffmpeg.txt`).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use livekeep_core::CommandLine;
use tokio::process::Command;

use crate::error::ProcError;

pub const MUX_FILE_SUFFIX: &str = "ffmpeg.txt";

/// The merge command plus every intermediate file to delete once it
/// succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub command: CommandLine,
    pub artifacts: Vec<PathBuf>,
}

impl MergePlan {
    /// Scan a session directory. `Ok(None)` when no mux file is present.
    pub fn discover(dir: &Path) -> Result<Option<Self>, ProcError> {
        let mut mux_file = None;
        let mut artifacts = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(MUX_FILE_SUFFIX) {
                mux_file = Some(path.clone());
                artifacts.push(path);
            } else if path.extension().is_some_and(|ext| ext == "ts") {
                artifacts.push(path);
            }
        }
        artifacts.sort();

        let Some(mux_file) = mux_file else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(&mux_file)?;
        let mut words = match shell_words::split(&text) {
            Ok(words) => words.into_iter(),
            Err(e) => {
                tracing::warn!(path = %mux_file.display(), "cannot parse mux command: {e}");
                return Err(ProcError::BadMuxFile(mux_file));
            }
        };
        let program = words.next().ok_or(ProcError::BadMuxFile(mux_file))?;

        Ok(Some(Self {
            command: CommandLine::new(program).args(words),
            artifacts,
        }))
    }
}

/// Run the merge. Intermediates are removed only when it exits 0.
pub async fn run_merge(plan: &MergePlan, cwd: &Path, stderr: Stdio) -> Result<(), ProcError> {
    tracing::info!(dir = %cwd.display(), cmd = %plan.command, "merging capture artifacts");
    let status = Command::new(&plan.command.program)
        .args(&plan.command.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| ProcError::spawn(&plan.command.program, source))?;

    if !status.success() {
        return Err(ProcError::MergeFailed(status));
    }

    for path in &plan.artifacts {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "cannot remove merge artifact: {e}"),
        }
    }
    Ok(())
}
