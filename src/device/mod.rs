//! Access to the PVR through the external `puppy` helper

mod client;
mod lock;
pub mod protocol;

pub use client::{DeviceClient, PuppyClient, TransferEnd, TransferPoll, E_GLOBAL_LOCK};
pub use lock::{lock_is_held, DEFAULT_LOCK_FILE};
pub use protocol::{EntryKind, FreeSpace, Progress, RemoteEntry};
