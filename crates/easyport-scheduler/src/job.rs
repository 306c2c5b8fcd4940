use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use easyport_core::panic_payload_to_str;
use parking_lot::{Condvar, Mutex};

use crate::{CancellationToken, ProgressSender};

/// Externally visible lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Idle,
    Scheduled,
    Running,
}

/// A unit of background work that can be scheduled repeatedly.
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self, monitor: &JobMonitor);

    /// Reports work that arrived after `run` last looked for it.
    ///
    /// Checked under the job's state lock once `run` returns; `true` re-runs the job instead of
    /// letting it go idle.
    fn has_pending_work(&self) -> bool {
        false
    }
}

/// Cancellation and progress reporting handed to a running job.
#[derive(Clone)]
pub struct JobMonitor {
    token: CancellationToken,
    progress: ProgressSender,
}

impl JobMonitor {
    pub fn new(token: CancellationToken, progress: ProgressSender) -> Self {
        Self { token, progress }
    }

    /// A monitor nobody listens to. Useful when running jobs by hand.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), ProgressSender::with_capacity(16))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn progress(&self) -> &ProgressSender {
        &self.progress
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token,
            progress: self.progress.clone(),
        }
    }
}

impl fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobMonitor")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Something that can run jobs in the background.
pub trait Executor: Send + Sync {
    /// Requests execution of `job`.
    ///
    /// Requests for a job that is already scheduled or running are ignored, so concurrent callers
    /// collapse into a single run.
    fn schedule(&self, job: &JobHandle);
}

struct JobSlot {
    job: Arc<dyn Job>,
    state: Mutex<JobState>,
    idle: Condvar,
}

/// Shared handle to a job together with its run state.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobSlot>,
}

impl JobHandle {
    pub fn new(job: Arc<dyn Job>) -> Self {
        Self {
            inner: Arc::new(JobSlot {
                job,
                state: Mutex::new(JobState::Idle),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.job.name()
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == JobState::Idle
    }

    /// Moves the job from `Idle` to `Scheduled`.
    ///
    /// Returns `false` if the job was already scheduled or running; the caller must then not run
    /// it.
    pub fn try_schedule(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state != JobState::Idle {
            return false;
        }
        *state = JobState::Scheduled;
        true
    }

    /// Runs a job previously claimed with [`JobHandle::try_schedule`] on the current thread.
    ///
    /// Keeps re-running while [`Job::has_pending_work`] reports work and the monitor is not
    /// cancelled, then marks the job idle.
    pub fn execute(&self, monitor: &JobMonitor) {
        loop {
            *self.inner.state.lock() = JobState::Running;

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.inner.job.run(monitor)
            }));
            if let Err(panic) = result {
                tracing::error!(
                    target = "easyport.scheduler",
                    job = self.name(),
                    panic = %panic_payload_to_str(&*panic),
                    "job panicked"
                );
            }

            let mut state = self.inner.state.lock();
            if !monitor.is_cancelled() && self.inner.job.has_pending_work() {
                tracing::trace!(target = "easyport.scheduler", job = self.name(), "re-running job");
                *state = JobState::Scheduled;
                continue;
            }
            *state = JobState::Idle;
            self.inner.idle.notify_all();
            return;
        }
    }

    /// Blocks until the job is idle or `timeout` elapses. Returns whether the job is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while *state != JobState::Idle {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return *state == JobState::Idle;
            }
        }
        true
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
