//! Accumulating log of PVR errors, shown on demand in its own popup.

use chrono::{DateTime, Local};
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct ErrorLogEntry {
    pub time: DateTime<Local>,
    pub message: String,
    /// Raw helper output, if any.
    pub details: String,
}

impl ErrorLogEntry {
    pub fn heading(&self) -> String {
        format!("ERROR: {}", self.time.format("%a %b %d, %I:%M %p"))
    }
}

#[derive(Debug, Default)]
pub struct DeviceErrorLog {
    entries: Mutex<Vec<ErrorLogEntry>>,
    unseen: Mutex<usize>,
}

impl DeviceErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: impl Into<String>, details: impl Into<String>) {
        let entry = ErrorLogEntry {
            time: Local::now(),
            message: message.into(),
            details: details.into(),
        };
        tracing::error!("{} ({})", entry.message.replace('\n', " "), entry.details.trim());
        self.entries.lock().push(entry);
        *self.unseen.lock() += 1;
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries added since the log was last viewed.
    pub fn unseen(&self) -> usize {
        *self.unseen.lock()
    }

    pub fn mark_seen(&self) {
        *self.unseen.lock() = 0;
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        self.mark_seen();
    }
}
