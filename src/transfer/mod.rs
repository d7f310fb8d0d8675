//! Queued file transfers between the computer and the PVR.

mod job;
mod queue;
mod worker;

pub use job::{Direction, JobStatus, TransferJob};
pub use queue::{QueueItem, TransferQueue};
pub use worker::{TransferWorker, NUM_OF_RESET_ATTEMPTS, NUM_OF_TRANSFER_ATTEMPTS};
