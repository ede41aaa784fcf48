//! livekeep-core: pure domain types for the live-capture supervisor.
//! Channel identity, content filters, session naming, capture methods and
//! the capture task state machine. No IO, no async.

pub mod channel;
pub mod error;
pub mod metadata;
pub mod method;
pub mod naming;
pub mod retry;
pub mod sanitize;
pub mod state;

pub use channel::{ChannelDescriptor, ChannelKey, ContentFilter, UrlPolicy, is_http_url};
pub use error::CoreError;
pub use metadata::StreamMetadata;
pub use method::{
    CaptureMethod, CaptureTarget, CommandBuilder, CommandLine, DEFAULT_POT_PROVIDER, MethodKind,
    ProxyPool, StreamlinkArgs, YtArchiveArgs, YtDlpArgs,
};
pub use naming::{LIVE_PREFIX, SessionName, format_elapsed};
pub use retry::RetryPolicy;
pub use state::{StateMachine, TaskState};
