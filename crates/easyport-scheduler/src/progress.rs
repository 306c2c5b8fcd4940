use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin {
        id: ProgressId,
        title: String,
        total: Option<u32>,
    },
    Report {
        id: ProgressId,
        message: Option<String>,
        done: u32,
        percentage: Option<u32>,
    },
    End {
        id: ProgressId,
        message: Option<String>,
    },
}

pub type ProgressReceiver = broadcast::Receiver<ProgressEvent>;

/// Fan-out of progress events to any number of subscribers.
///
/// Sending never blocks; events are dropped when nobody is subscribed.
#[derive(Clone)]
pub struct ProgressSender {
    tx: broadcast::Sender<ProgressEvent>,
    next_id: Arc<AtomicU64>,
}

impl ProgressSender {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.tx.subscribe()
    }

    /// Starts a progress scope of `total` units of work (`None` if unknown).
    pub fn begin(&self, title: impl Into<String>, total: Option<u32>) -> Progress {
        let id = ProgressId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(ProgressEvent::Begin {
            id,
            title: title.into(),
            total,
        });
        Progress {
            id,
            total,
            done: Arc::new(AtomicU32::new(0)),
            tx: self.tx.clone(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Clone)]
pub struct Progress {
    id: ProgressId,
    total: Option<u32>,
    done: Arc<AtomicU32>,
    tx: broadcast::Sender<ProgressEvent>,
    finished: Arc<AtomicBool>,
}

impl Progress {
    pub fn id(&self) -> ProgressId {
        self.id
    }

    /// Records `units` more units of work as done.
    pub fn worked(&self, units: u32, message: impl Into<Option<String>>) {
        let done = self.done.fetch_add(units, Ordering::Relaxed).saturating_add(units);
        let percentage = self
            .total
            .filter(|total| *total > 0)
            .map(|total| (u64::from(done.min(total)) * 100 / u64::from(total)) as u32);
        let _ = self.tx.send(ProgressEvent::Report {
            id: self.id,
            message: message.into(),
            done,
            percentage,
        });
    }

    pub fn finish(&self, message: impl Into<Option<String>>) {
        let message = message.into();
        if self
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.tx.send(ProgressEvent::End {
                id: self.id,
                message,
            });
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        // Clones share `finished`; only the last one ends the scope implicitly.
        if Arc::strong_count(&self.finished) == 1 {
            self.finish(None);
        }
    }
}
