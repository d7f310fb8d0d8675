use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::entry::FileRow;
use super::untitled_folder_name;
use crate::cache::DirectoryCache;
use crate::device::protocol::{join_remote, normalize_remote, REMOTE_ROOT, REMOTE_SEPARATOR};
use crate::device::{DeviceClient, FreeSpace, RemoteEntry};
use crate::error::{Error, Result};

const CACHE_UPDATE_ATTEMPTS: u32 = 2;
const CACHE_BUSY_PAUSE: Duration = Duration::from_secs(1);

/// Rebuild the whole cache, trying again once if the PVR is busy.
pub fn update_cache(
    client: &dyn DeviceClient,
    cache: &DirectoryCache,
    exclusions: &[String],
) -> Result<bool> {
    let mut attempt = 1;
    loop {
        match cache.rebuild_full(client, exclusions) {
            Err(e) if e.is_busy() && attempt < CACHE_UPDATE_ATTEMPTS => {
                debug!("PVR busy while updating cache, retrying");
                attempt += 1;
                thread::sleep(CACHE_BUSY_PAUSE);
            }
            result => return result,
        }
    }
}

/// The PVR side of the file manager. Browsing goes through the directory
/// cache, everything that changes the PVR goes straight to the device.
pub struct RemoteFilesystem {
    client: Arc<dyn DeviceClient>,
    cache: Arc<DirectoryCache>,
    exclusions: Vec<String>,
    current_dir: String,
    last_free_space: Option<FreeSpace>,
}

impl RemoteFilesystem {
    pub fn new(
        client: Arc<dyn DeviceClient>,
        cache: Arc<DirectoryCache>,
        exclusions: Vec<String>,
    ) -> Self {
        Self {
            client,
            cache,
            exclusions,
            current_dir: REMOTE_ROOT.to_string(),
            last_free_space: None,
        }
    }

    pub fn client(&self) -> Arc<dyn DeviceClient> {
        Arc::clone(&self.client)
    }

    pub fn cache(&self) -> Arc<DirectoryCache> {
        Arc::clone(&self.cache)
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    pub fn current_dir(&self) -> &str {
        &self.current_dir
    }

    pub fn abspath(&self, name: &str) -> String {
        join_remote(&self.current_dir, name)
    }

    pub fn has_parent(&self) -> bool {
        self.current_dir != REMOTE_ROOT
    }

    /// Absolute, normalised form of `dir` as seen from the current directory.
    pub fn resolve(&self, dir: &str) -> String {
        if dir.starts_with(REMOTE_SEPARATOR) {
            normalize_remote(dir)
        } else {
            normalize_remote(&self.abspath(dir))
        }
    }

    /// True when entering `dir` needs a listing from the PVR first.
    pub fn needs_scan(&self, dir: &str) -> bool {
        self.cache
            .find(&self.resolve(dir))
            .map_or(false, |node| node.needs_scan())
    }

    /// Change to `dir`, listing it on the PVR if the cache has not got it.
    pub fn change_dir(&mut self, dir: &str) -> Result<()> {
        let target = self.resolve(dir);
        let node = self
            .cache
            .find(&target)
            .ok_or_else(|| Error::RemotePathNotFound(target.clone()))?;

        if node.needs_scan() {
            self.cache
                .rebuild_subtree(self.client.as_ref(), &target, &self.exclusions)?;
        }

        self.set_current_dir(&target)
    }

    /// Move to a directory the cache already knows, without asking the PVR.
    pub fn set_current_dir(&mut self, dir: &str) -> Result<()> {
        let target = self.resolve(dir);
        if self.cache.find(&target).is_none() {
            return Err(Error::RemotePathNotFound(target));
        }
        debug!("Remote directory is now {}", target);
        self.current_dir = target;
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<RemoteEntry>> {
        self.cache
            .find(&self.current_dir)
            .map(|node| node.entries())
            .ok_or_else(|| Error::RemotePathNotFound(self.current_dir.clone()))
    }

    /// Cached entries of the current directory, without `..`.
    pub fn list(&self) -> Result<Vec<FileRow>> {
        Ok(self.entries()?.iter().map(FileRow::from).collect())
    }

    /// Whether the current directory is marked unreadable in the cache.
    pub fn is_unreadable(&self) -> bool {
        self.cache
            .find(&self.current_dir)
            .map_or(false, |node| !node.readable)
    }

    pub fn find(&self, name: &str) -> Option<RemoteEntry> {
        self.entries()
            .ok()?
            .into_iter()
            .find(|entry| entry.name == name)
    }

    /// Asks the PVR, the cache may be out of date.
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.existing_names()?.contains(name))
    }

    /// Names in the current directory according to the PVR.
    pub fn existing_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .client
            .list_dir(&self.current_dir)?
            .into_iter()
            .filter(|entry| !entry.is_parent())
            .map(|entry| entry.name)
            .collect())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        self.client.delete(&self.abspath(name))
    }

    pub fn rename(&self, old: &str, new: &str, overwrite: bool) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.exists(new)? {
            if !overwrite {
                return Err(Error::NameConflict(new.to_string()));
            }
            // The helper cannot rename onto an existing name, so the target
            // goes first and is not restored if the rename fails.
            self.client.delete(&self.abspath(new))?;
            if let Err(e) = self.client.rename(&self.abspath(old), &self.abspath(new)) {
                warn!("Rename of {} failed after {} was deleted: {}", old, new, e);
                return Err(Error::Device(format!(
                    "{}\nThe replaced \"{}\" was already deleted.",
                    e, new
                )));
            }
            return Ok(());
        }
        self.client.rename(&self.abspath(old), &self.abspath(new))
    }

    pub fn mkdir(&self) -> Result<String> {
        let listing = self.client.list_dir(&self.current_dir)?;
        let name = untitled_folder_name(|name| listing.iter().any(|entry| entry.name == name));
        self.client.make_dir(&self.abspath(&name))?;
        Ok(name)
    }

    /// Free space on the PVR disk. A busy PVR answers with the last known
    /// value.
    pub fn free_space(&mut self) -> Result<FreeSpace> {
        match self.client.disk_space() {
            Ok(space) => {
                self.last_free_space = Some(space);
                Ok(space)
            }
            Err(e) if e.is_busy() => {
                debug!("PVR busy, using cached free space");
                self.last_free_space.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn cached_free_space(&self) -> Option<FreeSpace> {
        self.last_free_space
    }

    /// Rebuild the cache and make sure the current directory still exists.
    pub fn update_cache(&mut self) -> Result<bool> {
        let rebuilt = update_cache(self.client.as_ref(), &self.cache, &self.exclusions)?;
        self.ensure_current_dir();
        Ok(rebuilt)
    }

    /// Walk up to the nearest directory the cache still knows about.
    pub fn ensure_current_dir(&mut self) {
        while self.cache.find(&self.current_dir).is_none() {
            let parent = normalize_remote(&format!("{}{}..", self.current_dir, REMOTE_SEPARATOR));
            if parent == self.current_dir {
                break;
            }
            warn!("{} disappeared from the PVR, moving to {}", self.current_dir, parent);
            self.current_dir = parent;
        }
    }
}
