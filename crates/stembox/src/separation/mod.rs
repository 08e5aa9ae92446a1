//! Separation job orchestration: queue, worker subprocess and fan-out.

pub mod job;
pub mod manager;
pub mod protocol;
pub mod updates;
pub mod worker;

pub use job::{JobStatus, SeparationJob, SeparationQuality};
pub use manager::SeparationManager;
pub use protocol::{decode_line, WorkerMessage};
pub use updates::{JobSnapshotFn, JobUpdates, SubscriptionId};
pub use worker::{
    ProgressFn, SeparationRequest, SeparationWorker, StemPaths, StemSeparator,
};
