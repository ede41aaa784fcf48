//! livekeep-source: channel lists on disk.
//! Expands input paths, parses the TOML entries into `ChannelDescriptor`s,
//! deduplicates them, and tracks file modification times so callers can
//! notice edits.

pub mod entry;
pub mod error;
pub mod source;

pub use error::SourceError;
pub use source::{ChannelSource, Resolved};
