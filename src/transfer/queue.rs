use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

use super::job::TransferJob;

#[derive(Debug, Clone)]
pub enum QueueItem {
    Job(Arc<TransferJob>),
    /// Tells the worker to exit. Always the last item.
    Shutdown,
}

#[derive(Debug, Default)]
struct Pending {
    items: VecDeque<QueueItem>,
    closed: bool,
}

/// Pending jobs for the worker plus the jobs it has finished with.
#[derive(Debug, Default)]
pub struct TransferQueue {
    pending: Mutex<Pending>,
    available: Condvar,
    completed: Mutex<VecDeque<Arc<TransferJob>>>,
}

impl TransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job. Returns `false` once shutdown has been requested.
    pub fn push(&self, job: Arc<TransferJob>) -> bool {
        let mut pending = self.pending.lock();
        if pending.closed {
            tracing::warn!("Queue is shut down, dropping {}", job.file_name());
            return false;
        }
        pending.items.push_back(QueueItem::Job(job));
        self.available.notify_one();
        true
    }

    pub fn push_shutdown(&self) {
        let mut pending = self.pending.lock();
        pending.closed = true;
        pending.items.push_back(QueueItem::Shutdown);
        self.available.notify_all();
    }

    pub fn pop_blocking(&self) -> QueueItem {
        let mut pending = self.pending.lock();
        loop {
            if let Some(item) = pending.items.pop_front() {
                return item;
            }
            self.available.wait(&mut pending);
        }
    }

    /// Remove every queued job, leaving a pending shutdown in place.
    pub fn drain_pending(&self) -> Vec<Arc<TransferJob>> {
        let mut pending = self.pending.lock();
        let mut jobs = Vec::new();
        pending.items.retain(|item| match item {
            QueueItem::Job(job) => {
                jobs.push(Arc::clone(job));
                false
            }
            QueueItem::Shutdown => true,
        });
        jobs
    }

    /// Jobs still waiting, in queue order.
    pub fn pending_jobs(&self) -> Vec<Arc<TransferJob>> {
        self.pending
            .lock()
            .items
            .iter()
            .filter_map(|item| match item {
                QueueItem::Job(job) => Some(Arc::clone(job)),
                QueueItem::Shutdown => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    pub fn push_completed(&self, job: Arc<TransferJob>) {
        self.completed.lock().push_back(job);
    }

    pub fn drain_completed(&self) -> Vec<Arc<TransferJob>> {
        self.completed.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn job(name: &str) -> Arc<TransferJob> {
        Arc::new(TransferJob::upload(
            format!("/tmp/{}", name),
            format!("\\{}", name),
            "",
            1,
        ))
    }

    #[test]
    fn fifo_order() {
        let queue = TransferQueue::new();
        let a = job("a");
        let b = job("b");
        queue.push(Arc::clone(&a));
        queue.push(Arc::clone(&b));

        match queue.pop_blocking() {
            QueueItem::Job(j) => assert_eq!(j.id, a.id),
            QueueItem::Shutdown => panic!("unexpected shutdown"),
        }
        match queue.pop_blocking() {
            QueueItem::Job(j) => assert_eq!(j.id, b.id),
            QueueItem::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn pop_waits_for_producer() {
        let queue = Arc::new(TransferQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || matches!(queue.pop_blocking(), QueueItem::Shutdown))
        };
        thread::sleep(Duration::from_millis(50));
        queue.push_shutdown();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn shutdown_closes_queue_and_survives_drain() {
        let queue = TransferQueue::new();
        queue.push(job("a"));
        queue.push(job("b"));

        let drained = queue.drain_pending();
        assert_eq!(drained.len(), 2);
        queue.push_shutdown();
        assert!(queue.is_closed());
        assert!(!queue.push(job("c")));
        assert!(queue.drain_pending().is_empty());
        assert!(matches!(queue.pop_blocking(), QueueItem::Shutdown));
    }

    #[test]
    fn completed_jobs_are_drained_once() {
        let queue = TransferQueue::new();
        queue.push_completed(job("a"));
        assert_eq!(queue.drain_completed().len(), 1);
        assert!(queue.drain_completed().is_empty());
    }
}
