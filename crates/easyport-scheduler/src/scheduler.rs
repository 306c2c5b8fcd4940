use std::sync::Arc;

use rayon::ThreadPool;

use crate::{CancellationToken, Executor, JobHandle, JobMonitor, ProgressReceiver, ProgressSender};

enum BlockingPool {
    Rayon(ThreadPool),
    Inline,
}

impl BlockingPool {
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            BlockingPool::Rayon(pool) => pool.spawn(job),
            BlockingPool::Inline => job(),
        }
    }
}

fn build_rayon_pool(prefix: &'static str, threads: usize) -> BlockingPool {
    // Thread creation can fail under low process limits; shrink the pool instead of failing.
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |idx| format!("{prefix}-{idx}"))
            .build()
        {
            Ok(pool) => return BlockingPool::Rayon(pool),
            Err(_) if threads > 1 => {
                threads = (threads / 2).max(1);
            }
            Err(err) => {
                tracing::warn!(
                    target = "easyport.scheduler",
                    error = %err,
                    "no background threads available, running jobs inline"
                );
                return BlockingPool::Inline;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Threads shared by all background jobs. Each job still runs at most once at a time.
    pub background_threads: usize,
    pub progress_channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            background_threads: available.clamp(1, 2),
            progress_channel_capacity: 1024,
        }
    }
}

/// The production [`Executor`]: runs jobs on a named rayon pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    background_pool: BlockingPool,
    progress: ProgressSender,
    token: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                background_pool: build_rayon_pool("easyport-background", config.background_threads),
                progress: ProgressSender::with_capacity(config.progress_channel_capacity),
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn progress(&self) -> ProgressSender {
        self.inner.progress.clone()
    }

    pub fn subscribe_progress(&self) -> ProgressReceiver {
        self.inner.progress.subscribe()
    }

    /// Cancels every running job's monitor and rejects future schedule requests.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }
}

impl Executor for Scheduler {
    fn schedule(&self, job: &JobHandle) {
        if self.is_shut_down() {
            tracing::debug!(
                target = "easyport.scheduler",
                job = job.name(),
                "scheduler shut down, dropping schedule request"
            );
            return;
        }
        if !job.try_schedule() {
            return;
        }

        tracing::trace!(target = "easyport.scheduler", job = job.name(), "job scheduled");
        let job = job.clone();
        let monitor = JobMonitor::new(self.inner.token.child_token(), self.progress());
        self.inner.background_pool.spawn(move || job.execute(&monitor));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
