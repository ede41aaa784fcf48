use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no usable channel list among {inputs} input(s)")]
    NoUsableSources { inputs: usize },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("toml decode error in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("cannot rewrite {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("toml encode error: {0}")]
    Encode(#[from] toml::ser::Error),
}
