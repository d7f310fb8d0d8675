//! Error types shared by the device client, the directory cache and the
//! filesystem views.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Another helper instance holds the device lock.
    #[error("PVR is busy: {0}")]
    Busy(String),

    /// The helper could not autodetect a PVR on the bus.
    #[error("PVR not connected. Please check that your computer is connected to the PVR.")]
    DeviceNotFound(String),

    /// Any other helper failure, carrying the helper's output.
    #[error("{0}")]
    Device(String),

    #[error("Failed to run transfer helper `{program}`: {source}")]
    Helper {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("\"{0}\" already exists")]
    NameConflict(String),

    #[error("Remote path not found: {0}")]
    RemotePathNotFound(String),
}

impl Error {
    pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// True for failures reported by (or on the way to) the PVR.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::Busy(_) | Error::DeviceNotFound(_) | Error::Device(_) | Error::Helper { .. }
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy(_))
    }

    /// The PVR could not be reached at all, as opposed to one request failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Busy(_) | Error::DeviceNotFound(_))
    }

    /// Raw helper output for the error log, when there is any.
    pub fn diagnostics(&self) -> String {
        match self {
            Error::Busy(output) | Error::DeviceNotFound(output) | Error::Device(output) => {
                output.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_are_classified() {
        assert!(Error::Busy("locked".into()).is_device_error());
        assert!(Error::Busy("locked".into()).is_busy());
        assert!(Error::DeviceNotFound(String::new()).is_device_error());
        assert!(!Error::NameConflict("a".into()).is_device_error());
        assert!(!Error::local_io("/tmp/x", io::Error::from(io::ErrorKind::NotFound))
            .is_device_error());
    }

    #[test]
    fn diagnostics_prefer_helper_output() {
        let err = Error::Device("ERROR: Device reports Invalid command".into());
        assert_eq!(err.diagnostics(), "ERROR: Device reports Invalid command");
        let err = Error::DeviceNotFound("ERROR: Can not autodetect a Topfield TF5000PVRt".into());
        assert!(err.to_string().starts_with("PVR not connected"));
        assert!(err.diagnostics().contains("autodetect"));
    }
}
