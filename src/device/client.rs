use parking_lot::Mutex;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use super::lock::{lock_is_held, DEFAULT_LOCK_FILE};
use super::protocol::{self, FreeSpace, Progress, RemoteEntry};
use crate::error::{Error, Result};

/// puppy exit code when it cannot take its global lock.
pub const E_GLOBAL_LOCK: i32 = 8;
/// puppy exit code when the PVR disk has not spun up yet.
pub const E_HDD_NOT_READY: i32 = 185;
/// Exit code reported by shells for a SIGTERM'd child.
const SIGTERM_EXIT_CODE: i32 = 15;

const HDD_NOT_READY_PAUSE: Duration = Duration::from_secs(1);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a transfer process ended once its progress stream ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEnd {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransferPoll {
    Running(Progress),
    Done(TransferEnd),
}

/// Operations the rest of the application needs from the PVR.
///
/// Every call is one helper invocation. `get_file`/`put_file` return as soon
/// as the helper is running; the caller then polls `get_progress` until it
/// reports `Done` or an error.
pub trait DeviceClient: Send + Sync {
    fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>>;
    fn disk_space(&self) -> Result<FreeSpace>;
    fn make_dir(&self, path: &str) -> Result<()>;
    fn rename(&self, old: &str, new: &str) -> Result<()>;
    fn delete(&self, path: &str) -> Result<()>;
    fn set_turbo(&self, enabled: bool) -> Result<()>;
    /// Best effort device reset. Never fails, only reports success.
    fn reset(&self) -> bool;
    fn get_file(&self, src: &str, dst: &Path) -> Result<()>;
    fn put_file(&self, src: &Path, dst: &str) -> Result<()>;
    fn get_progress(&self) -> Result<TransferPoll>;
    /// Stop the running transfer, if any. Safe to call at any time.
    fn cancel_transfer(&self);
}

struct RunningTransfer {
    child: Child,
    status: Option<ExitStatus>,
    output: String,
    stdout: Option<JoinHandle<String>>,
}

impl RunningTransfer {
    fn new(mut child: Child) -> Self {
        // Drained while the helper runs so a chatty stdout cannot stall it.
        let stdout = child.stdout.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                if let Err(e) = pipe.read_to_string(&mut text) {
                    debug!("Failed to read transfer helper output: {}", e);
                }
                text
            })
        });
        Self {
            child,
            status: None,
            output: String::new(),
            stdout,
        }
    }

    fn collect_stdout(&mut self) {
        if let Some(reader) = self.stdout.take() {
            match reader.join() {
                Ok(text) => self.output.push_str(&text),
                Err(_) => warn!("Transfer helper output reader panicked"),
            }
        }
    }

    fn record(&mut self, status: ExitStatus) -> ExitStatus {
        self.status = Some(status);
        self.collect_stdout();
        status
    }

    fn poll(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(self.record(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::Device(format!("Failed to poll transfer helper: {}", e))),
        }
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self
            .child
            .wait()
            .map_err(|e| Error::Device(format!("Failed to reap transfer helper: {}", e)))?;
        Ok(self.record(status))
    }
}

fn was_terminated(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(libc::SIGTERM) {
            return true;
        }
    }
    status.code() == Some(SIGTERM_EXIT_CODE)
}

fn classify_failure(code: Option<i32>, output: String) -> Error {
    if code == Some(E_GLOBAL_LOCK) {
        Error::Busy(output)
    } else if protocol::is_device_not_found(&output) {
        Error::DeviceNotFound(output)
    } else if output.trim().is_empty() {
        Error::Device(match code {
            Some(code) => format!("Transfer helper exited with status {}", code),
            None => "Transfer helper was killed".to_string(),
        })
    } else {
        Error::Device(output)
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // SAFETY: plain signal delivery to a child we have not reaped yet.
        let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            warn!("Failed to signal transfer helper: {}", std::io::Error::last_os_error());
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.kill() {
            warn!("Failed to kill transfer helper: {}", e);
        }
    }
}

/// Read one carriage-return terminated record, skipping empty ones.
/// Returns an empty string at end of stream.
fn read_record(reader: &mut BufReader<ChildStderr>) -> String {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\r', &mut buf) {
            Ok(0) => return String::new(),
            Ok(_) => {
                if buf == b"\r" {
                    continue;
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                return String::from_utf8_lossy(&buf).into_owned();
            }
            Err(e) => {
                warn!("Failed to read transfer progress: {}", e);
                return String::new();
            }
        }
    }
}

/// [`DeviceClient`] backed by the `puppy` command line helper.
pub struct PuppyClient {
    program: String,
    lock_file: PathBuf,
    transfer: Mutex<Option<RunningTransfer>>,
    progress: Mutex<Option<BufReader<ChildStderr>>>,
}

impl PuppyClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_lock_file(program, DEFAULT_LOCK_FILE)
    }

    pub fn with_lock_file(program: impl Into<String>, lock_file: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            lock_file: lock_file.into(),
            transfer: Mutex::new(None),
            progress: Mutex::new(None),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the helper binary can be found at all.
    pub fn helper_available(&self) -> bool {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return program.is_file();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }

    fn ensure_not_busy(&self) -> Result<()> {
        match lock_is_held(&self.lock_file) {
            Ok(false) => Ok(()),
            Ok(true) => Err(Error::Busy(format!(
                "Can not get exclusive lock on {}",
                self.lock_file.display()
            ))),
            Err(e) => {
                // An unusable lock file is most likely held by someone else.
                warn!("Probing {} failed: {}", self.lock_file.display(), e);
                Err(Error::Busy(format!(
                    "Can not get exclusive lock on {}: {}",
                    self.lock_file.display(),
                    e
                )))
            }
        }
    }

    fn helper_error(&self, source: std::io::Error) -> Error {
        Error::Helper {
            program: self.program.clone(),
            source,
        }
    }

    fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        debug!(
            "Running {} {:?}",
            self.program,
            args.iter()
                .map(|a| AsRef::<OsStr>::as_ref(a))
                .collect::<Vec<_>>()
        );

        let run_once = || -> Result<Output> {
            self.ensure_not_busy()?;
            Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::null())
                .output()
                .map_err(|e| self.helper_error(e))
        };

        let output = run_once()?;
        if output.status.code() == Some(E_HDD_NOT_READY) {
            debug!("PVR disk not ready, retrying once");
            thread::sleep(HDD_NOT_READY_PAUSE);
            return run_once();
        }
        Ok(output)
    }

    fn request<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_failure(output.status.code(), combined_output(&output)))
        }
    }

    fn start_transfer(&self, command: &str, src: &OsStr, dst: &OsStr) -> Result<()> {
        // A previous transfer must be gone before we can talk to the PVR.
        self.cancel_transfer();
        self.ensure_not_busy()?;

        debug!("Starting {} {:?} -> {:?}", command, src, dst);
        let mut child = Command::new(&self.program)
            .args(["-i", "-c", command])
            .arg(src)
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.helper_error(e))?;

        *self.progress.lock() = child.stderr.take().map(BufReader::new);

        let mut running = RunningTransfer::new(child);

        // puppy may bail out straight away, e.g. when the source is missing.
        if let Some(status) = running.poll()? {
            if !status.success() && !was_terminated(&status) {
                let mut output = std::mem::take(&mut running.output);
                if let Some(reader) = self.progress.lock().as_mut() {
                    let _ = reader.read_to_string(&mut output);
                }
                *self.progress.lock() = None;
                *self.transfer.lock() = Some(running);
                return Err(classify_failure(status.code(), output));
            }
        }

        *self.transfer.lock() = Some(running);
        Ok(())
    }

    fn with_transfer<T>(&self, f: impl FnOnce(&mut RunningTransfer) -> T) -> Result<T> {
        let mut guard = self.transfer.lock();
        let running = guard
            .as_mut()
            .ok_or_else(|| Error::Device("No transfer in progress".to_string()))?;
        Ok(f(running))
    }

    /// Wait for the helper to exit without holding the lock, so a cancel from
    /// another thread is never stuck behind us.
    fn wait_for_exit(&self) -> Result<ExitStatus> {
        loop {
            if let Some(status) = self.with_transfer(RunningTransfer::poll)?? {
                return Ok(status);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

impl DeviceClient for PuppyClient {
    fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let output = self.request(["-c", "dir", path])?;
        Ok(protocol::parse_dir_listing(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn disk_space(&self) -> Result<FreeSpace> {
        let output = self.request(["-c", "size"])?;
        let text = String::from_utf8_lossy(&output.stdout);
        protocol::parse_disk_space(&text)
            .ok_or_else(|| Error::Device(format!("Unexpected size output: {}", text)))
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        self.request(["-c", "mkdir", path]).map(|_| ())
    }

    fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.request(["-c", "rename", old, new]).map(|_| ())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.request(["-c", "delete", path]).map(|_| ())
    }

    fn set_turbo(&self, enabled: bool) -> Result<()> {
        let value = if enabled { "1" } else { "0" };
        self.request(["-c", "turbo", value]).map(|_| ())
    }

    fn reset(&self) -> bool {
        match self.run(["-c", "cancel"]) {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("Reset failed: {}", e);
                false
            }
        }
    }

    fn get_file(&self, src: &str, dst: &Path) -> Result<()> {
        self.start_transfer("get", OsStr::new(src), dst.as_os_str())
    }

    fn put_file(&self, src: &Path, dst: &str) -> Result<()> {
        self.start_transfer("put", src.as_os_str(), OsStr::new(dst))
    }

    fn get_progress(&self) -> Result<TransferPoll> {
        {
            let mut guard = self.transfer.lock();
            let running = guard
                .as_mut()
                .ok_or_else(|| Error::Device("No transfer in progress".to_string()))?;
            if let Some(status) = running.poll()? {
                if !status.success() && !was_terminated(&status) {
                    return Err(classify_failure(
                        status.code(),
                        std::mem::take(&mut running.output),
                    ));
                }
            }
        }

        // Blocks until the helper rewrites its progress line or exits.
        let record = match self.progress.lock().as_mut() {
            Some(reader) => read_record(reader),
            None => String::new(),
        };

        if let Some(progress) = protocol::parse_progress(&record) {
            return Ok(TransferPoll::Running(progress));
        }

        self.with_transfer(|running| running.output.push_str(&record))?;
        let status = self.wait_for_exit()?;
        *self.progress.lock() = None;

        if status.success() {
            Ok(TransferPoll::Done(TransferEnd::Completed))
        } else if was_terminated(&status) {
            Ok(TransferPoll::Done(TransferEnd::Cancelled))
        } else {
            let output = self.with_transfer(|running| std::mem::take(&mut running.output))?;
            Err(classify_failure(status.code(), output))
        }
    }

    fn cancel_transfer(&self) {
        let mut guard = self.transfer.lock();
        let Some(running) = guard.as_mut() else {
            return;
        };

        match running.poll() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                return;
            }
        }

        debug!("Cancelling transfer (pid {})", running.child.id());
        terminate(&mut running.child);
        if let Err(e) = running.wait() {
            warn!("{}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// Write a shell script standing in for puppy.
    fn fake_helper(dir: &Path, body: &str) -> String {
        let path = dir.join("puppy");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn client(dir: &Path, body: &str) -> PuppyClient {
        PuppyClient::with_lock_file(fake_helper(dir, body), dir.join("lock"))
    }

    #[test]
    fn lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(
            dir.path(),
            r#"echo "d 0 Tue Mar 06 21:10:12 2007 DataFiles"
echo "f 2048 Mon Jan 01 20:30:00 2007 show.rec""#,
        );

        let entries = client.list_dir("\\").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "show.rec");
        assert_eq!(entries[1].size, 2048);
    }

    #[test]
    fn exit_codes_map_to_error_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let busy = client(dir.path(), "echo 'ERROR: Can not obtain exclusive lock'; exit 8");
        assert!(matches!(busy.list_dir("\\"), Err(Error::Busy(_))));

        let dir = tempfile::tempdir().unwrap();
        let missing = client(
            dir.path(),
            "echo 'ERROR: Can not autodetect a Topfield TF5000PVRt'; exit 1",
        );
        assert!(matches!(missing.make_dir("\\x"), Err(Error::DeviceNotFound(_))));

        let dir = tempfile::tempdir().unwrap();
        let generic = client(dir.path(), "echo 'ERROR: Device reports Invalid command' >&2; exit 1");
        match generic.delete("\\x") {
            Err(Error::Device(text)) => assert!(text.contains("Invalid command")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reset_reports_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!client(dir.path(), "exit 1").reset());
        let dir = tempfile::tempdir().unwrap();
        assert!(client(dir.path(), "exit 0").reset());
    }

    #[test]
    fn missing_helper_is_a_helper_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = PuppyClient::with_lock_file("/nonexistent/puppy", dir.path().join("lock"));
        assert!(!client.helper_available());
        assert!(matches!(client.disk_space(), Err(Error::Helper { .. })));
    }

    #[test]
    fn transfer_progress_until_completion() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(
            dir.path(),
            r#"for p in 50 100; do
  printf '\r%6.2f%%, %5.2f Mbits/s, 00:00:01 elapsed, 0:00:01 remaining' $p 2.2 >&2
done
echo"#,
        );

        client.get_file("\\show.rec", &dir.path().join("show.rec")).unwrap();
        let mut percents = Vec::new();
        loop {
            match client.get_progress().unwrap() {
                TransferPoll::Running(p) => percents.push(p.percent),
                TransferPoll::Done(end) => {
                    assert_eq!(end, TransferEnd::Completed);
                    break;
                }
            }
        }
        assert_eq!(percents, vec![50.0, 100.0]);
        // Nothing left to cancel.
        client.cancel_transfer();
    }

    #[test]
    fn chatty_stdout_does_not_stall_progress() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(
            dir.path(),
            r#"head -c 300000 /dev/zero | tr '\0' x
printf '\r 50.00%%,  2.20 Mbits/s, 00:00:01 elapsed, 0:00:01 remaining' >&2
echo done"#,
        );

        client.get_file("\\show.rec", &dir.path().join("show.rec")).unwrap();
        assert!(matches!(client.get_progress(), Ok(TransferPoll::Running(_))));
        assert_eq!(
            client.get_progress().unwrap(),
            TransferPoll::Done(TransferEnd::Completed)
        );
    }

    #[test]
    fn cancel_while_waiting_for_exit() {
        let dir = tempfile::tempdir().unwrap();
        // Closes the progress stream but keeps running.
        let client = client(dir.path(), "exec 2>&-\nexec sleep 30");

        client.get_file("\\show.rec", &dir.path().join("show.rec")).unwrap();
        thread::scope(|s| {
            let poller = s.spawn(|| client.get_progress());
            thread::sleep(Duration::from_millis(200));

            let started = std::time::Instant::now();
            client.cancel_transfer();
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(
                poller.join().unwrap().unwrap(),
                TransferPoll::Done(TransferEnd::Cancelled)
            );
        });
    }

    #[test]
    fn failed_transfer_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path(), "echo 'ERROR: Device reports Invalid command'; exit 1");

        let started = client.put_file(&dir.path().join("x"), "\\x");
        let err = match started {
            Err(e) => e,
            Ok(()) => loop {
                match client.get_progress() {
                    Err(e) => break e,
                    Ok(TransferPoll::Done(end)) => panic!("unexpected end {:?}", end),
                    Ok(TransferPoll::Running(_)) => {}
                }
            },
        };
        assert!(err.is_device_error());
    }

    #[test]
    fn cancelled_transfer_ends_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let client = client(
            dir.path(),
            r#"printf '\r 10.00%%,  2.20 Mbits/s, 00:00:01 elapsed, 0:00:09 remaining\r' >&2
exec sleep 30"#,
        );

        client.get_file("\\show.rec", &dir.path().join("show.rec")).unwrap();
        assert!(matches!(client.get_progress(), Ok(TransferPoll::Running(_))));

        client.cancel_transfer();
        client.cancel_transfer();
        assert_eq!(
            client.get_progress().unwrap(),
            TransferPoll::Done(TransferEnd::Cancelled)
        );
    }

    #[test]
    fn held_lock_fails_fast() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let client = client(dir.path(), "exit 0");
        let holder = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(dir.path().join("lock"))
            .unwrap();
        unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        assert!(matches!(client.set_turbo(true), Err(Error::Busy(_))));
    }
}
