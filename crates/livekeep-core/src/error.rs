//! Error types for the pure core.

use thiserror::Error;

use crate::state::TaskState;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("stream metadata is not a JSON object")]
    NotAnObject,

    #[error("stream metadata is missing field `{0}`")]
    MissingField(&'static str),

    #[error("illegal task transition {from} -> {to}")]
    IllegalTransition { from: TaskState, to: TaskState },

    #[error("unknown capture method: {0:?} (expected streamlink, yt-dlp or ytarchive)")]
    UnknownMethod(String),
}
