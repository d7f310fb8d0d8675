#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};

use pvrdeck::device::{
    DeviceClient, EntryKind, FreeSpace, Progress, RemoteEntry, TransferEnd, TransferPoll,
};
use pvrdeck::error::{Error, Result};
use pvrdeck::events::TransferEvent;

pub const WAIT: Duration = Duration::from_secs(10);

/// What the next `get_progress` call reports.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Progress(f64),
    Fail,
    /// Keep reporting progress until the transfer is cancelled.
    UntilCancelled,
}

/// How the next start of a transfer, or a turbo switch, is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Answer {
    #[default]
    Ok,
    Busy,
    Fail,
}

impl Answer {
    fn into_result(self, what: &str) -> Result<()> {
        match self {
            Answer::Ok => Ok(()),
            Answer::Busy => Err(Error::Busy(
                "ERROR: Can not obtain exclusive lock".to_string(),
            )),
            Answer::Fail => Err(Error::Device(format!("ERROR: {} failed", what))),
        }
    }
}

/// Scripted stand-in for the puppy helper.
#[derive(Default)]
pub struct FakeDevice {
    pub dirs: Mutex<BTreeMap<String, Vec<RemoteEntry>>>,
    pub script: Mutex<VecDeque<Step>>,
    pub free: Mutex<u64>,
    pub turbo_calls: Mutex<Vec<bool>>,
    pub resets: AtomicUsize,
    pub starts: Mutex<Vec<String>>,
    /// Answers for `get_file`/`put_file`, `Ok` once drained.
    pub start_script: Mutex<VecDeque<Answer>>,
    pub turbo_on: Mutex<Answer>,
    /// Every listing and size query reports a missing PVR.
    pub unplugged: AtomicBool,
    pub cancelled: AtomicBool,
}

impl FakeDevice {
    pub fn new() -> Self {
        let device = Self::default();
        *device.free.lock() = u64::MAX / 2;
        device.dirs.lock().insert("\\".to_string(), Vec::new());
        device
    }

    pub fn add_file(&self, dir: &str, name: &str, date: &str, size: u64) {
        self.dirs
            .lock()
            .entry(dir.to_string())
            .or_default()
            .push(RemoteEntry {
                kind: EntryKind::File,
                name: name.to_string(),
                date: date.to_string(),
                size,
            });
    }

    pub fn add_dir(&self, parent: &str, name: &str) {
        self.dirs
            .lock()
            .entry(parent.to_string())
            .or_default()
            .push(RemoteEntry {
                kind: EntryKind::Dir,
                name: name.to_string(),
                date: "Mon Jan 01 2007".to_string(),
                size: 0,
            });
        let path = if parent == "\\" {
            format!("\\{}", name)
        } else {
            format!("{}\\{}", parent, name)
        };
        self.dirs.lock().entry(path).or_default();
    }

    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().extend(steps);
    }

    pub fn script_starts(&self, answers: impl IntoIterator<Item = Answer>) {
        self.start_script.lock().extend(answers);
    }

    fn next_start(&self) -> Result<()> {
        let answer = self.start_script.lock().pop_front().unwrap_or_default();
        answer.into_result("Can not open source file")
    }

    fn check_plugged(&self) -> Result<()> {
        if self.unplugged.load(Ordering::SeqCst) {
            Err(Error::DeviceNotFound(
                "ERROR: Can not autodetect a Topfield TF5000PVRt".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn turbo_calls(&self) -> Vec<bool> {
        self.turbo_calls.lock().clone()
    }
}

fn progress(percent: f64) -> Progress {
    Progress {
        percent,
        speed: "2.20 Mbits/s".to_string(),
        elapsed: "00:00:01".to_string(),
        remaining: "00:00:10".to_string(),
    }
}

impl DeviceClient for FakeDevice {
    fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.check_plugged()?;
        self.dirs
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Device(format!("No such directory {}", path)))
    }

    fn disk_space(&self) -> Result<FreeSpace> {
        self.check_plugged()?;
        let free = *self.free.lock();
        Ok(FreeSpace {
            total: free.saturating_mul(2),
            free,
        })
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        self.dirs.lock().insert(path.to_string(), Vec::new());
        Ok(())
    }

    fn rename(&self, _old: &str, _new: &str) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn set_turbo(&self, enabled: bool) -> Result<()> {
        self.turbo_calls.lock().push(enabled);
        if enabled {
            self.turbo_on.lock().into_result("turbo")
        } else {
            Ok(())
        }
    }

    fn reset(&self) -> bool {
        self.resets.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn get_file(&self, src: &str, dst: &Path) -> Result<()> {
        self.starts.lock().push(src.to_string());
        self.next_start()?;
        std::fs::write(dst, b"recording").map_err(|e| Error::local_io(dst, e))
    }

    fn put_file(&self, src: &Path, dst: &str) -> Result<()> {
        self.starts.lock().push(format!("{} -> {}", src.display(), dst));
        self.next_start()
    }

    fn get_progress(&self) -> Result<TransferPoll> {
        let step = self.script.lock().front().copied();
        match step {
            None => Ok(TransferPoll::Done(TransferEnd::Completed)),
            Some(Step::UntilCancelled) => {
                if self.cancelled.load(Ordering::SeqCst) {
                    self.script.lock().pop_front();
                    Ok(TransferPoll::Done(TransferEnd::Cancelled))
                } else {
                    thread::sleep(Duration::from_millis(5));
                    Ok(TransferPoll::Running(progress(10.0)))
                }
            }
            Some(Step::Progress(percent)) => {
                self.script.lock().pop_front();
                Ok(TransferPoll::Running(progress(percent)))
            }
            Some(Step::Fail) => {
                self.script.lock().pop_front();
                Err(Error::Device("Transfer failed: usb timeout".to_string()))
            }
        }
    }

    fn cancel_transfer(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Everything the worker posts up to and including `Shutdown`.
pub fn events_until_shutdown(events: &Receiver<TransferEvent>) -> Vec<TransferEvent> {
    let mut seen = Vec::new();
    loop {
        match events.recv_timeout(WAIT) {
            Ok(TransferEvent::Shutdown) => {
                seen.push(TransferEvent::Shutdown);
                return seen;
            }
            Ok(event) => seen.push(event),
            Err(e) => panic!("worker went quiet: {}", e),
        }
    }
}

/// Poll `done` until it holds, failing the test after a while.
pub fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting");
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn local_dir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
