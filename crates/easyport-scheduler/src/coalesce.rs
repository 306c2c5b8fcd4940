use std::{
    collections::HashSet,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use easyport_core::panic_payload_to_str;
use parking_lot::Mutex;

use crate::{run_with_timeout, Executor, Job, JobHandle, JobMonitor, JobState, TaskError};

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("{0}")]
    Message(String),

    #[error("{} item(s) of the batch failed: {}", .failures.len(), .failures.join("; "))]
    Partial { failures: Vec<String> },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl BatchError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// The expensive operation a [`CoalescingWorker`] runs on every drained batch.
///
/// A failed batch is logged and dropped; its keys are not re-queued.
pub trait BatchOperation<K>: Send + Sync + 'static {
    fn run_batch(&self, batch: &HashSet<K>, monitor: &JobMonitor) -> Result<(), BatchError>;
}

impl<K, F> BatchOperation<K> for F
where
    F: Fn(&HashSet<K>, &JobMonitor) -> Result<(), BatchError> + Send + Sync + 'static,
{
    fn run_batch(&self, batch: &HashSet<K>, monitor: &JobMonitor) -> Result<(), BatchError> {
        self(batch, monitor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Batch operation invocations.
    pub batches: u64,
    /// Keys handed to the batch operation, summed over all batches.
    pub items: u64,
    /// Batches that returned an error, panicked or timed out.
    pub failures: u64,
}

struct PendingQueue<K> {
    name: String,
    pending: Mutex<HashSet<K>>,
    operation: Arc<dyn BatchOperation<K>>,
    batch_timeout: Option<Duration>,
    batches: AtomicU64,
    items: AtomicU64,
    failures: AtomicU64,
}

impl<K> PendingQueue<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    fn take_snapshot(&self) -> HashSet<K> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn run_batch(&self, batch: HashSet<K>, monitor: &JobMonitor) {
        let batch_len = batch.len();
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.items.fetch_add(batch_len as u64, Ordering::Relaxed);
        tracing::debug!(
            target = "easyport.scheduler",
            worker = %self.name,
            batch_len,
            "running batch"
        );

        let result = match self.batch_timeout {
            None => std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.operation.run_batch(&batch, monitor)
            }))
            .map_err(|panic| TaskError::Panicked(panic_payload_to_str(&*panic).to_owned())),
            Some(timeout) => {
                let operation = Arc::clone(&self.operation);
                let monitor = monitor.clone();
                run_with_timeout(timeout, monitor.token().child_token(), move |token| {
                    operation.run_batch(&batch, &monitor.with_token(token))
                })
            }
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target = "easyport.scheduler",
                    worker = %self.name,
                    batch_len,
                    error = %err,
                    "batch failed"
                );
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target = "easyport.scheduler",
                    worker = %self.name,
                    batch_len,
                    error = %err,
                    "batch did not complete"
                );
            }
        }
    }
}

impl<K> Job for PendingQueue<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, monitor: &JobMonitor) {
        // Only an observed-empty snapshot ends the run, so keys that arrive while a batch is in
        // flight are picked up here without another schedule request.
        loop {
            let batch = self.take_snapshot();
            if batch.is_empty() {
                return;
            }
            if monitor.is_cancelled() {
                self.pending.lock().extend(batch);
                return;
            }
            self.run_batch(batch, monitor);
        }
    }

    fn has_pending_work(&self) -> bool {
        !self.pending.lock().is_empty()
    }
}

/// Coalesces keys submitted by many callers into batches drained by a single job.
///
/// Every key enqueued before a snapshot is part of that or an earlier batch; keys enqueued while a
/// batch runs are part of the next batch of the same run. Repeated submissions of a pending key
/// are merged. There is no ordering between keys.
pub struct CoalescingWorker<K> {
    queue: Arc<PendingQueue<K>>,
    handle: JobHandle,
    executor: Arc<dyn Executor>,
}

impl<K> CoalescingWorker<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        operation: impl BatchOperation<K>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self::new_with_timeout(name, operation, executor, None)
    }

    /// Like [`CoalescingWorker::new`], but every batch runs under a watchdog.
    ///
    /// An overrunning batch has its cancellation token cancelled and counts as failed. The worker
    /// stays running until that batch has returned and only then takes the next snapshot, so
    /// batches never overlap.
    pub fn new_with_timeout(
        name: impl Into<String>,
        operation: impl BatchOperation<K>,
        executor: Arc<dyn Executor>,
        batch_timeout: Option<Duration>,
    ) -> Self {
        let queue = Arc::new(PendingQueue {
            name: name.into(),
            pending: Mutex::new(HashSet::new()),
            operation: Arc::new(operation),
            batch_timeout,
            batches: AtomicU64::new(0),
            items: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });
        let handle = JobHandle::new(queue.clone());
        Self {
            queue,
            handle,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.queue.name
    }

    /// Adds `key` to the pending set. Returns `false` if it was already pending.
    pub fn enqueue(&self, key: K) -> bool {
        self.queue.pending.lock().insert(key)
    }

    pub fn state(&self) -> JobState {
        self.handle.state()
    }

    pub fn is_idle(&self) -> bool {
        self.handle.is_idle()
    }

    /// Asks the executor to start draining. No-op unless the worker is idle.
    pub fn request_run(&self) {
        if self.is_idle() {
            self.executor.schedule(&self.handle);
        }
    }

    /// Enqueues `key` and starts the worker if it is idle.
    ///
    /// The idle check races with a finishing run; at worst this yields one extra, empty run.
    pub fn submit(&self, key: K) {
        self.enqueue(key);
        if self.is_idle() {
            self.request_run();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.queue.pending.lock().len()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            batches: self.queue.batches.load(Ordering::Relaxed),
            items: self.queue.items.load(Ordering::Relaxed),
            failures: self.queue.failures.load(Ordering::Relaxed),
        }
    }

    /// Blocks until the worker is idle or `timeout` elapses. Returns whether it is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.handle.wait_idle(timeout)
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    /// Records schedule requests; tests drive the job by hand.
    #[derive(Default)]
    struct ManualExecutor {
        requests: Mutex<Vec<JobHandle>>,
    }

    impl ManualExecutor {
        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        fn run_next(&self) {
            let handle = self.requests.lock().remove(0);
            handle.execute(&JobMonitor::detached());
        }
    }

    impl Executor for ManualExecutor {
        fn schedule(&self, job: &JobHandle) {
            if job.try_schedule() {
                self.requests.lock().push(job.clone());
            }
        }
    }

    type Batches = Arc<Mutex<Vec<HashSet<&'static str>>>>;

    fn recording_worker(
        executor: Arc<ManualExecutor>,
    ) -> (CoalescingWorker<&'static str>, Batches) {
        let batches: Batches = Arc::default();
        let recorded = batches.clone();
        let worker = CoalescingWorker::new(
            "test",
            move |batch: &HashSet<&'static str>, _: &JobMonitor| -> Result<(), BatchError> {
                recorded.lock().push(batch.clone());
                Ok(())
            },
            executor,
        );
        (worker, batches)
    }

    #[test]
    fn repeated_submissions_are_merged() {
        let executor = Arc::new(ManualExecutor::default());
        let (worker, batches) = recording_worker(executor.clone());

        for _ in 0..5 {
            worker.submit("a");
        }
        worker.submit("b");

        assert_eq!(executor.request_count(), 1);
        assert_eq!(worker.state(), JobState::Scheduled);
        executor.run_next();

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], HashSet::from(["a", "b"]));
        assert!(worker.is_idle());
        assert_eq!(
            worker.stats(),
            WorkerStats {
                batches: 1,
                items: 2,
                failures: 0
            }
        );
    }

    #[test]
    fn request_run_is_noop_unless_idle() {
        let executor = Arc::new(ManualExecutor::default());
        let (worker, _batches) = recording_worker(executor.clone());

        worker.request_run();
        worker.request_run();
        assert_eq!(executor.request_count(), 1);

        executor.run_next();
        assert!(worker.is_idle());
        worker.request_run();
        assert_eq!(executor.request_count(), 1);
    }

    #[test]
    fn empty_run_terminates_immediately() {
        let executor = Arc::new(ManualExecutor::default());
        let (worker, batches) = recording_worker(executor.clone());

        worker.request_run();
        executor.run_next();

        assert!(batches.lock().is_empty());
        assert_eq!(worker.stats(), WorkerStats::default());
        assert!(worker.is_idle());
    }

    #[test]
    fn arrivals_during_a_batch_join_the_same_run() {
        let executor = Arc::new(ManualExecutor::default());
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);
        let batches: Batches = Arc::default();
        let recorded = batches.clone();

        let worker = Arc::new(CoalescingWorker::new(
            "test",
            move |batch: &HashSet<&'static str>, _: &JobMonitor| -> Result<(), BatchError> {
                let first = {
                    let mut batches = recorded.lock();
                    batches.push(batch.clone());
                    batches.len() == 1
                };
                if first {
                    let _ = started_tx.lock().send(());
                    let _ = release_rx.lock().recv();
                }
                Ok(())
            },
            executor.clone() as Arc<dyn Executor>,
        ));

        worker.submit("a");
        worker.submit("b");
        assert_eq!(executor.request_count(), 1);
        let handle = executor.requests.lock().remove(0);
        let runner = std::thread::spawn(move || handle.execute(&JobMonitor::detached()));

        started_rx.recv().expect("first batch started");
        assert_eq!(worker.state(), JobState::Running);
        worker.submit("c");
        assert_eq!(executor.request_count(), 0);
        release_tx.send(()).expect("release first batch");
        runner.join().expect("runner thread");

        let batches = batches.lock();
        assert_eq!(
            *batches,
            vec![HashSet::from(["a", "b"]), HashSet::from(["c"])]
        );
        assert!(worker.is_idle());
    }

    #[test]
    fn failed_batches_are_not_requeued() {
        let executor = Arc::new(ManualExecutor::default());
        let worker = CoalescingWorker::new(
            "test",
            |batch: &HashSet<&'static str>, _: &JobMonitor| -> Result<(), BatchError> {
                if batch.contains("bad") {
                    Err(BatchError::message("broken pom"))
                } else {
                    Ok(())
                }
            },
            executor.clone() as Arc<dyn Executor>,
        );

        worker.submit("bad");
        executor.run_next();
        assert_eq!(worker.pending_len(), 0);

        worker.submit("good");
        executor.run_next();
        assert_eq!(
            worker.stats(),
            WorkerStats {
                batches: 2,
                items: 2,
                failures: 1
            }
        );
    }

    #[test]
    fn panicking_batch_does_not_stop_the_worker() {
        let executor = Arc::new(ManualExecutor::default());
        let worker = Arc::new(CoalescingWorker::new(
            "test",
            |batch: &HashSet<&'static str>, _: &JobMonitor| -> Result<(), BatchError> {
                if batch.contains("panic") {
                    panic!("batch operation exploded");
                }
                Ok(())
            },
            executor.clone() as Arc<dyn Executor>,
        ));

        worker.submit("panic");
        executor.run_next();
        assert!(worker.is_idle());

        worker.submit("fine");
        executor.run_next();
        assert_eq!(worker.stats().batches, 2);
        assert_eq!(worker.stats().failures, 1);
    }

    #[test]
    fn overrunning_batch_times_out() {
        let executor = Arc::new(ManualExecutor::default());
        let worker = CoalescingWorker::new_with_timeout(
            "test",
            |_: &HashSet<&'static str>, monitor: &JobMonitor| -> Result<(), BatchError> {
                while !monitor.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            },
            executor.clone() as Arc<dyn Executor>,
            Some(Duration::from_millis(30)),
        );

        worker.submit("slow");
        executor.run_next();

        assert!(worker.is_idle());
        assert_eq!(worker.stats().failures, 1);
    }

    #[test]
    fn timed_out_batches_never_overlap() {
        use std::sync::atomic::AtomicUsize;

        let executor = Arc::new(ManualExecutor::default());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);

        let worker = Arc::new(CoalescingWorker::new_with_timeout(
            "test",
            {
                let active = active.clone();
                let max_active = max_active.clone();
                move |_: &HashSet<&'static str>, _: &JobMonitor| -> Result<(), BatchError> {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    let _ = started_tx.lock().send(());
                    // Ignores cancellation on purpose.
                    std::thread::sleep(Duration::from_millis(100));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            executor.clone() as Arc<dyn Executor>,
            Some(Duration::from_millis(20)),
        ));

        worker.submit("a");
        let handle = executor.requests.lock().remove(0);
        let runner = std::thread::spawn(move || handle.execute(&JobMonitor::detached()));

        started_rx.recv().expect("first batch started");
        worker.submit("b");
        runner.join().expect("runner thread");

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(
            worker.stats(),
            WorkerStats {
                batches: 2,
                items: 2,
                failures: 2
            }
        );
        assert!(worker.is_idle());
    }
}
