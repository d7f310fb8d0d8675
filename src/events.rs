use crate::device::Progress;
use crate::error::Error;
use crate::transfer::JobStatus;

/// Messages from the transfer worker to the UI thread.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    JobStarted(u64),
    Progress { job_id: u64, progress: Progress },
    JobFinished { job_id: u64, status: JobStatus },
    /// Both views should be reloaded, the PVR contents changed.
    RefreshViews,
    /// The worker has exited.
    Shutdown,
}

/// Results of background cache rebuilds.
#[derive(Debug)]
pub enum CacheEvent {
    /// `root_readable` is false when the rebuild kept the previous tree.
    Rebuilt { root_readable: bool },
    SubtreeRebuilt(String),
    Error(Error),
}
