//! livekeep-proc: external process IO boundary.
//! Spawning and supervising the recorder processes, liveness probing, the
//! post-capture merge step, and the async retry driver. No scheduling
//! decisions live here.

pub mod error;
pub mod group;
pub mod handle;
pub mod merge;
pub mod probe;
pub mod retry;
pub mod run;

pub use error::ProcError;
pub use group::{CaptureProcessGroup, GroupSpec};
pub use handle::ProcessHandle;
pub use merge::{MergePlan, run_merge};
pub use probe::{LivenessProbe, StreamlinkProbe};
pub use retry::retry;
pub use run::{run_output, run_status};
