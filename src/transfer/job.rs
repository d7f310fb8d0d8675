use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::device::protocol::remote_basename;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    pub fn verb(self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Transferring,
    Finished,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            JobStatus::Queued => "Queued",
            JobStatus::Transferring => "Transferring",
            JobStatus::Finished => "Finished",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        };
        f.write_str(text)
    }
}

/// One file to copy between the computer and the PVR.
///
/// Jobs are shared between the UI and the worker behind an `Arc`, so all
/// mutable state is interior.
#[derive(Debug)]
pub struct TransferJob {
    pub id: u64,
    pub direction: Direction,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Date of the source file in `%a %b %d %Y` form.
    pub source_mod_time: String,
    /// Size of the source file, for display and free space checks.
    pub size: u64,
    alive: AtomicBool,
    quit_after_transfer: AtomicBool,
    status: Mutex<JobStatus>,
}

impl TransferJob {
    pub fn new(
        direction: Direction,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        source_mod_time: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            direction,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            source_mod_time: source_mod_time.into(),
            size,
            alive: AtomicBool::new(true),
            quit_after_transfer: AtomicBool::new(false),
            status: Mutex::new(JobStatus::Queued),
        }
    }

    pub fn download(
        remote_path: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_date: impl Into<String>,
        size: u64,
    ) -> Self {
        Self::new(Direction::Download, local_path, remote_path, remote_date, size)
    }

    pub fn upload(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        local_date: impl Into<String>,
        size: u64,
    ) -> Self {
        Self::new(Direction::Upload, local_path, remote_path, local_date, size)
    }

    pub fn source(&self) -> String {
        match self.direction {
            Direction::Upload => self.local_path.display().to_string(),
            Direction::Download => self.remote_path.clone(),
        }
    }

    pub fn destination(&self) -> String {
        match self.direction {
            Direction::Upload => self.remote_path.clone(),
            Direction::Download => self.local_path.display().to_string(),
        }
    }

    /// Name of the file being copied.
    pub fn file_name(&self) -> String {
        match self.direction {
            Direction::Upload => file_name_of(&self.local_path),
            Direction::Download => remote_basename(&self.remote_path).to_string(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> JobStatus {
        *self.status.lock()
    }

    /// Stop the job. Has no effect on a job that already ended.
    pub fn cancel(&self) {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);
        if *status == JobStatus::Queued {
            *status = JobStatus::Cancelled;
        }
    }

    /// Take the job for transfer. Fails if it was cancelled or another
    /// worker got there first.
    pub fn claim(&self) -> bool {
        let mut status = self.status.lock();
        if *status != JobStatus::Queued || !self.is_alive() {
            return false;
        }
        *status = JobStatus::Transferring;
        true
    }

    /// Record the outcome. A job cancelled while transferring always ends
    /// as cancelled.
    pub fn complete(&self, outcome: JobStatus) -> JobStatus {
        let mut status = self.status.lock();
        if status.is_terminal() {
            return *status;
        }
        let outcome = if !self.is_alive() {
            JobStatus::Cancelled
        } else {
            outcome
        };
        *status = outcome;
        self.alive.store(false, Ordering::SeqCst);
        outcome
    }

    pub fn quit_after_transfer(&self) -> bool {
        self.quit_after_transfer.load(Ordering::Relaxed)
    }

    pub fn set_quit_after_transfer(&self, quit: bool) {
        self.quit_after_transfer.store(quit, Ordering::Relaxed);
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TransferJob {
        TransferJob::download("\\MOVIES\\show.rec", "/tmp/show.rec", "Mon Jan 01 2007", 10)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(job().id, job().id);
    }

    #[test]
    fn names_follow_direction() {
        let down = job();
        assert_eq!(down.file_name(), "show.rec");
        assert_eq!(down.source(), "\\MOVIES\\show.rec");
        assert_eq!(down.destination(), "/tmp/show.rec");

        let up = TransferJob::upload("/home/me/clip.mpg", "\\clip.mpg", "", 1);
        assert_eq!(up.file_name(), "clip.mpg");
        assert_eq!(up.direction.verb(), "upload");
    }

    #[test]
    fn cancel_is_idempotent() {
        let job = job();
        job.cancel();
        assert!(!job.is_alive());
        assert_eq!(job.status(), JobStatus::Cancelled);
        job.cancel();
        assert!(!job.is_alive());
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(!job.claim());
    }

    #[test]
    fn cancel_after_completion_is_a_no_op() {
        let job = job();
        assert!(job.claim());
        assert_eq!(job.complete(JobStatus::Finished), JobStatus::Finished);
        job.cancel();
        assert_eq!(job.status(), JobStatus::Finished);
    }

    #[test]
    fn claim_only_once() {
        let job = job();
        assert!(job.claim());
        assert!(!job.claim());
        assert_eq!(job.status(), JobStatus::Transferring);
    }

    #[test]
    fn cancelled_while_transferring_ends_cancelled() {
        let job = job();
        assert!(job.claim());
        job.cancel();
        assert_eq!(job.status(), JobStatus::Transferring);
        assert_eq!(job.complete(JobStatus::Failed), JobStatus::Cancelled);
        assert_eq!(job.status(), JobStatus::Cancelled);
    }
}
