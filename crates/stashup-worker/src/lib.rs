//! Stashup Worker
//!
//! Drains the contribution queue one upload at a time: chunked stash transfer,
//! commit under a collision-free name, structured-data edits and completion
//! bookkeeping. Progress and outcomes are reported as notification intents.

pub mod completion;
pub mod context;
pub mod control;
pub mod edit;
pub mod naming;
mod progress;
pub mod queue;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::UploadContext;
pub use control::TransferControl;
pub use naming::resolve_unique_name;
pub use queue::{DrainReport, UploadWorker, WorkerOutcome};
pub use upload::UploadOutcome;
