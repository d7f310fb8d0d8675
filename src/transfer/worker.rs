//! Background thread that runs queued transfers one at a time.

use filetime::FileTime;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::job::{Direction, JobStatus, TransferJob};
use super::queue::{QueueItem, TransferQueue};
use crate::device::{DeviceClient, TransferEnd, TransferPoll};
use crate::error::Result;
use crate::error_log::DeviceErrorLog;
use crate::events::TransferEvent;
use crate::fs::entry::local_midnight;

/// Transfer attempts per job before it is reported as failed.
pub const NUM_OF_TRANSFER_ATTEMPTS: u32 = 2;
/// Resets tried between two transfer attempts.
pub const NUM_OF_RESET_ATTEMPTS: u32 = 6;

const BUSY_START_ATTEMPTS: u32 = 12;
const BUSY_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Turns turbo mode off again when dropped. The PVR remote control is dead
/// while turbo is on.
struct TurboGuard<'a> {
    client: &'a dyn DeviceClient,
    armed: bool,
}

impl<'a> TurboGuard<'a> {
    fn enter(client: &'a dyn DeviceClient, wanted: bool) -> Self {
        // Only a busy PVR surely never saw the request. Any other failure may
        // have come after turbo was switched on.
        let armed = wanted
            && match client.set_turbo(true) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to enable turbo mode: {}", e);
                    !e.is_busy()
                }
            };
        Self { client, armed }
    }
}

impl Drop for TurboGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.client.set_turbo(false) {
                warn!("Failed to disable turbo mode: {}", e);
            }
        }
    }
}

pub struct TransferWorker {
    client: Arc<dyn DeviceClient>,
    queue: Arc<TransferQueue>,
    events: Sender<TransferEvent>,
    error_log: Arc<DeviceErrorLog>,
    turbo: Arc<AtomicBool>,
    busy_pause: Duration,
}

impl TransferWorker {
    pub fn new(
        client: Arc<dyn DeviceClient>,
        queue: Arc<TransferQueue>,
        events: Sender<TransferEvent>,
        error_log: Arc<DeviceErrorLog>,
        turbo: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            queue,
            events,
            error_log,
            turbo,
            busy_pause: BUSY_RETRY_PAUSE,
        }
    }

    /// Pause between start attempts while the PVR is busy.
    pub fn with_busy_pause(mut self, pause: Duration) -> Self {
        self.busy_pause = pause;
        self
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("transfer-worker".into())
            .spawn(move || self.run())
    }

    pub fn run(self) {
        info!("Transfer worker started");
        loop {
            let job = match self.queue.pop_blocking() {
                QueueItem::Shutdown => {
                    info!("Transfer worker shutting down");
                    self.post(TransferEvent::Shutdown);
                    return;
                }
                QueueItem::Job(job) => job,
            };

            if !job.is_alive() {
                debug!("Skipping cancelled job {}", job.id);
                continue;
            }
            if !job.claim() {
                debug!("Job {} already taken", job.id);
                continue;
            }

            let status = self.process(&job);
            info!("{} of {} ended: {}", job.direction.verb(), job.file_name(), status);

            self.queue.push_completed(Arc::clone(&job));
            self.post(TransferEvent::RefreshViews);

            if job.quit_after_transfer() {
                info!("Quit requested after job {}", job.id);
                self.post(TransferEvent::Shutdown);
                return;
            }
        }
    }

    fn post(&self, event: TransferEvent) {
        if self.events.send(event).is_err() {
            debug!("UI has gone away, dropping transfer event");
        }
    }

    /// Run a claimed job to the end and record the outcome.
    fn process(&self, job: &TransferJob) -> JobStatus {
        info!(
            "Starting {} {} -> {}",
            job.direction.verb(),
            job.source(),
            job.destination()
        );
        self.post(TransferEvent::JobStarted(job.id));

        let outcome = {
            let _turbo = TurboGuard::enter(self.client.as_ref(), self.turbo.load(Ordering::Relaxed));
            self.transfer(job)
        };

        let status = match &outcome {
            Ok(TransferEnd::Completed) => job.complete(JobStatus::Finished),
            Ok(TransferEnd::Cancelled) => job.complete(JobStatus::Cancelled),
            Err(_) => job.complete(JobStatus::Failed),
        };

        match (status, outcome) {
            (JobStatus::Finished, _) if job.direction == Direction::Download => {
                apply_remote_date(&job.local_path, &job.source_mod_time);
            }
            (JobStatus::Failed, Err(e)) => {
                let message = match job.direction {
                    Direction::Download => "Failed to download:",
                    Direction::Upload => "Failed to upload:",
                };
                self.error_log
                    .add(format!("{}\n{}", message, job.file_name()), e.diagnostics());
            }
            _ => {}
        }

        self.post(TransferEvent::JobFinished {
            job_id: job.id,
            status,
        });
        status
    }

    fn issue(&self, job: &TransferJob) -> Result<()> {
        match job.direction {
            Direction::Download => self.client.get_file(&job.remote_path, &job.local_path),
            Direction::Upload => self.client.put_file(&job.local_path, &job.remote_path),
        }
    }

    /// Start the transfer, waiting out a busy PVR. Returns false when the job
    /// was cancelled before the helper took it.
    fn start(&self, job: &TransferJob) -> Result<bool> {
        let mut tries = 1;
        loop {
            if !job.is_alive() {
                return Ok(false);
            }
            match self.issue(job) {
                Err(e) if e.is_busy() && tries < BUSY_START_ATTEMPTS => {
                    debug!("PVR busy, retrying {} in {:?}", job.file_name(), self.busy_pause);
                    tries += 1;
                    thread::sleep(self.busy_pause);
                }
                Err(e) if e.is_busy() && !job.is_alive() => return Ok(false),
                result => return result.map(|()| true),
            }
        }
    }

    fn reset_device(&self) {
        let reset = (0..NUM_OF_RESET_ATTEMPTS).any(|_| self.client.reset());
        if !reset {
            warn!("PVR did not accept a reset after {} tries", NUM_OF_RESET_ATTEMPTS);
        }
    }

    fn transfer(&self, job: &TransferJob) -> Result<TransferEnd> {
        if !self.start(job)? {
            return Ok(TransferEnd::Cancelled);
        }

        let mut attempts = 1;
        let mut failed_restart = None;
        loop {
            let poll = match failed_restart.take() {
                Some(e) => Err(e),
                None => self.client.get_progress(),
            };

            match poll {
                Ok(TransferPoll::Running(progress)) => {
                    if !job.is_alive() {
                        // The cancel may have reached the client before the
                        // helper was running.
                        self.client.cancel_transfer();
                    }
                    self.post(TransferEvent::Progress {
                        job_id: job.id,
                        progress,
                    });
                }
                Ok(TransferPoll::Done(end)) => return Ok(end),
                Err(e) => {
                    if !job.is_alive() {
                        return Ok(TransferEnd::Cancelled);
                    }
                    if attempts >= NUM_OF_TRANSFER_ATTEMPTS {
                        return Err(e);
                    }
                    warn!("Transfer of {} failed, resetting PVR: {}", job.file_name(), e);
                    attempts += 1;
                    self.reset_device();
                    if !job.is_alive() {
                        return Ok(TransferEnd::Cancelled);
                    }
                    if let Err(e) = self.issue(job) {
                        failed_restart = Some(e);
                    }
                }
            }
        }
    }
}

/// Give a downloaded file the date it has on the PVR.
fn apply_remote_date(path: &Path, date: &str) {
    let Some(midnight) = local_midnight(date) else {
        debug!("No usable date {:?} for {}", date, path.display());
        return;
    };
    let mtime = FileTime::from_unix_time(midnight.timestamp(), 0);
    if let Err(e) = filetime::set_file_times(path, FileTime::now(), mtime) {
        warn!("Failed to set modification time of {}: {}", path.display(), e);
    }
}
