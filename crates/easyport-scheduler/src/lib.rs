//! Background execution for easyport.
//!
//! - [`Scheduler`]: a rayon-backed [`Executor`] that runs [`Job`]s on a small background pool.
//! - [`JobHandle`]: the per-job `Idle -> Scheduled -> Running -> Idle` state machine.
//! - [`CoalescingWorker`]: collects keys from many callers into a pending set and drains them in
//!   batches through a single job.

mod coalesce;
mod job;
mod progress;
mod scheduler;
mod watchdog;

use std::time::Duration;

pub use coalesce::{BatchError, BatchOperation, CoalescingWorker, WorkerStats};
pub use job::{Executor, Job, JobHandle, JobMonitor, JobState};
pub use progress::{Progress, ProgressEvent, ProgressId, ProgressReceiver, ProgressSender};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use tokio_util::sync::CancellationToken;
pub use watchdog::run_with_timeout;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task was cancelled")]
    Cancelled,
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}
