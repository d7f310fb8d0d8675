//! In-memory mirror of the PVR directory tree.
//!
//! Listing the whole device through the helper takes a while, so the remote
//! view navigates this cache instead of asking the PVR on every directory
//! change. Rebuilds list the device without holding the tree lock and only
//! take it to swap the result in.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::device::protocol::{
    join_remote, normalize_remote, remote_basename, remote_components, REMOTE_ROOT,
};
use crate::device::{DeviceClient, RemoteEntry};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryNode {
    pub name: String,
    pub children: BTreeMap<String, (Arc<DirectoryNode>, RemoteEntry)>,
    pub files: Vec<RemoteEntry>,
    /// False when listing this directory failed.
    pub readable: bool,
    /// False for excluded directories that have not been listed yet.
    pub scanned: bool,
}

impl DirectoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: BTreeMap::new(),
            files: Vec::new(),
            readable: true,
            scanned: true,
        }
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            scanned: false,
            ..Self::new(name)
        }
    }

    pub fn unreadable(name: impl Into<String>) -> Self {
        Self {
            readable: false,
            ..Self::new(name)
        }
    }

    pub fn needs_scan(&self) -> bool {
        !self.scanned || !self.readable
    }

    pub fn has_content(&self) -> bool {
        !self.children.is_empty() || !self.files.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&Arc<DirectoryNode>> {
        self.children.get(name).map(|(node, _)| node)
    }

    /// Directory entries followed by file entries.
    pub fn entries(&self) -> Vec<RemoteEntry> {
        self.children
            .values()
            .map(|(_, entry)| entry.clone())
            .chain(self.files.iter().cloned())
            .collect()
    }

    pub fn find(&self, path: &str) -> Option<&DirectoryNode> {
        let mut node = self;
        for component in remote_components(path) {
            node = node.child(component)?;
        }
        Some(node)
    }
}

fn is_excluded(path: &str, exclusions: &[String]) -> bool {
    let path = normalize_remote(path);
    exclusions.iter().any(|ex| normalize_remote(ex) == path)
}

/// List `path` and everything below it.
///
/// Excluded subdirectories become unscanned placeholders. A directory that
/// cannot be listed comes back empty and unreadable; only `Busy` aborts the
/// scan.
pub fn rescan_subtree(
    client: &dyn DeviceClient,
    path: &str,
    exclusions: &[String],
) -> Result<DirectoryNode> {
    let path = normalize_remote(path);
    let name = remote_basename(&path);

    let listing = match client.list_dir(&path) {
        Ok(listing) => listing,
        Err(e) if e.is_unavailable() => return Err(e),
        Err(e) => {
            warn!("Failed to list {}: {}", path, e);
            return Ok(DirectoryNode::unreadable(name));
        }
    };

    let mut node = DirectoryNode::new(name);
    for entry in listing {
        if entry.is_dir() {
            if entry.is_parent() {
                continue;
            }
            let child_path = join_remote(&path, &entry.name);
            let child = if is_excluded(&child_path, exclusions) {
                debug!("Skipping excluded directory {}", child_path);
                DirectoryNode::placeholder(entry.name.as_str())
            } else {
                rescan_subtree(client, &child_path, exclusions)?
            };
            node.children
                .insert(entry.name.clone(), (Arc::new(child), entry));
        } else {
            node.files.push(entry);
        }
    }

    Ok(node)
}

/// Carry known content over into subtrees that could not be listed this time.
fn merge_stale(fresh: &mut DirectoryNode, old: &DirectoryNode) {
    if !fresh.readable {
        if old.has_content() {
            fresh.children = old.children.clone();
            fresh.files = old.files.clone();
        }
        return;
    }

    for (name, (child, _)) in fresh.children.iter_mut() {
        if let Some((old_child, _)) = old.children.get(name) {
            merge_stale(Arc::make_mut(child), old_child);
        }
    }
}

#[derive(Debug)]
pub struct DirectoryCache {
    tree: Mutex<Arc<DirectoryNode>>,
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Arc::new(DirectoryNode::placeholder(""))),
        }
    }

    pub fn snapshot(&self) -> Arc<DirectoryNode> {
        Arc::clone(&self.tree.lock())
    }

    pub fn find(&self, path: &str) -> Option<DirectoryNode> {
        self.snapshot().find(path).cloned()
    }

    /// Rescan the whole device. Returns `false` and keeps the current tree
    /// when the root itself cannot be listed.
    pub fn rebuild_full(&self, client: &dyn DeviceClient, exclusions: &[String]) -> Result<bool> {
        info!("Rebuilding remote directory cache");
        let mut fresh = rescan_subtree(client, REMOTE_ROOT, exclusions)?;
        if !fresh.readable {
            warn!("PVR root directory is unreadable, keeping previous cache");
            return Ok(false);
        }

        let mut tree = self.tree.lock();
        merge_stale(&mut fresh, &tree);
        *tree = Arc::new(fresh);
        Ok(true)
    }

    /// Rescan the directory at `path` and splice it into the tree.
    pub fn rebuild_subtree(
        &self,
        client: &dyn DeviceClient,
        path: &str,
        exclusions: &[String],
    ) -> Result<()> {
        let path = normalize_remote(path);
        let components: Vec<String> = remote_components(&path).map(str::to_string).collect();
        let Some((last, parents)) = components.split_last() else {
            return self.rebuild_full(client, exclusions).map(|_| ());
        };

        debug!("Rebuilding cache subtree {}", path);
        let mut fresh = rescan_subtree(client, &path, exclusions)?;

        let mut tree = self.tree.lock();
        if tree.find(&path).is_none() {
            return Err(Error::RemotePathNotFound(path));
        }

        let mut node = Arc::make_mut(&mut *tree);
        for component in parents {
            let (child, _) = node
                .children
                .get_mut(component)
                .ok_or_else(|| Error::RemotePathNotFound(path.clone()))?;
            node = Arc::make_mut(child);
        }
        let (slot, _) = node
            .children
            .get_mut(last)
            .ok_or_else(|| Error::RemotePathNotFound(path.clone()))?;

        merge_stale(&mut fresh, slot);
        *slot = Arc::new(fresh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{EntryKind, FreeSpace, TransferPoll};
    use std::collections::HashMap;
    use std::path::Path;

    /// Listing-only device. Paths missing from the map fail to list.
    #[derive(Default)]
    struct ListingDevice {
        dirs: Mutex<HashMap<String, Vec<RemoteEntry>>>,
        busy: Mutex<bool>,
        unplugged: Mutex<bool>,
    }

    fn entry(kind: EntryKind, name: &str) -> RemoteEntry {
        RemoteEntry {
            kind,
            name: name.to_string(),
            date: "Mon Jan 01 2007".to_string(),
            size: if kind == EntryKind::Dir { 0 } else { 1024 },
        }
    }

    impl ListingDevice {
        fn with(dirs: &[(&str, Vec<RemoteEntry>)]) -> Self {
            let device = Self::default();
            for (path, entries) in dirs {
                device.dirs.lock().insert(path.to_string(), entries.clone());
            }
            device
        }

        fn remove(&self, path: &str) {
            self.dirs.lock().remove(path);
        }
    }

    impl DeviceClient for ListingDevice {
        fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>> {
            if *self.busy.lock() {
                return Err(Error::Busy("locked".into()));
            }
            if *self.unplugged.lock() {
                return Err(Error::DeviceNotFound("ERROR: Can not autodetect".into()));
            }
            self.dirs
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::Device(format!("ERROR: Device reports File Not Found {}", path)))
        }
        fn disk_space(&self) -> Result<FreeSpace> {
            unimplemented!()
        }
        fn make_dir(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        fn rename(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
        fn delete(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        fn set_turbo(&self, _: bool) -> Result<()> {
            unimplemented!()
        }
        fn reset(&self) -> bool {
            true
        }
        fn get_file(&self, _: &str, _: &Path) -> Result<()> {
            unimplemented!()
        }
        fn put_file(&self, _: &Path, _: &str) -> Result<()> {
            unimplemented!()
        }
        fn get_progress(&self) -> Result<TransferPoll> {
            unimplemented!()
        }
        fn cancel_transfer(&self) {}
    }

    fn device() -> ListingDevice {
        use EntryKind::*;
        ListingDevice::with(&[
            (
                "\\",
                vec![
                    entry(Dir, ".."),
                    entry(Dir, "DataFiles"),
                    entry(Dir, "MOVIES"),
                    entry(File, "top.rec"),
                ],
            ),
            ("\\DataFiles", vec![entry(File, "show.rec")]),
            (
                "\\MOVIES",
                vec![entry(Dir, ".."), entry(Dir, "Old"), entry(File, "film.rec")],
            ),
            ("\\MOVIES\\Old", vec![entry(File, "ancient.rec")]),
        ])
    }

    fn exclusions() -> Vec<String> {
        vec!["\\DataFiles".to_string()]
    }

    #[test]
    fn full_rebuild_mirrors_device() {
        let device = device();
        let cache = DirectoryCache::new();
        assert!(cache.rebuild_full(&device, &exclusions()).unwrap());

        let root = cache.snapshot();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.files.len(), 1);
        assert!(root.child("..").is_none());

        let data = cache.find("\\DataFiles").unwrap();
        assert!(!data.scanned);
        assert!(!data.has_content());

        let old = cache.find("\\MOVIES\\Old").unwrap();
        assert_eq!(old.files[0].name, "ancient.rec");
        assert!(cache.find("\\MOVIES\\Missing").is_none());
    }

    #[test]
    fn excluded_directory_is_scanned_on_demand() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();

        cache
            .rebuild_subtree(&device, "\\DataFiles", &exclusions())
            .unwrap();
        let data = cache.find("\\DataFiles").unwrap();
        assert!(data.scanned && data.readable);
        assert_eq!(data.files[0].name, "show.rec");
        // The rest of the tree is untouched.
        assert!(cache.find("\\MOVIES\\Old").is_some());
    }

    #[test]
    fn unreadable_subtree_is_marked_and_keeps_old_content() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();

        device.remove("\\MOVIES");
        assert!(cache.rebuild_full(&device, &exclusions()).unwrap());

        let movies = cache.find("\\MOVIES").unwrap();
        assert!(!movies.readable);
        assert!(movies.needs_scan());
        assert_eq!(movies.files[0].name, "film.rec");

        // A fresh scan of an unreadable directory has nothing to show.
        let node = rescan_subtree(&device, "\\MOVIES", &exclusions()).unwrap();
        assert!(!node.readable);
        assert!(!node.has_content());
    }

    #[test]
    fn unreadable_root_keeps_previous_tree() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();
        let before = cache.snapshot();

        device.remove("\\");
        assert!(!cache.rebuild_full(&device, &exclusions()).unwrap());
        assert_eq!(*cache.snapshot(), *before);
    }

    #[test]
    fn busy_device_aborts_rebuild() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();

        *device.busy.lock() = true;
        assert!(matches!(
            cache.rebuild_full(&device, &exclusions()),
            Err(Error::Busy(_))
        ));
        assert!(cache.find("\\MOVIES\\Old").is_some());
    }

    #[test]
    fn missing_device_aborts_rebuild() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();

        *device.unplugged.lock() = true;
        assert!(matches!(
            cache.rebuild_subtree(&device, "\\MOVIES", &exclusions()),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            cache.rebuild_full(&device, &exclusions()),
            Err(Error::DeviceNotFound(_))
        ));
        assert!(cache.find("\\MOVIES\\Old").is_some());
    }

    #[test]
    fn subtree_rebuild_of_unknown_path_is_an_error() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();

        let err = cache
            .rebuild_subtree(&device, "\\Nowhere\\Else", &exclusions())
            .unwrap_err();
        assert!(matches!(err, Error::RemotePathNotFound(_)));
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let device = device();
        let cache = DirectoryCache::new();
        cache.rebuild_full(&device, &exclusions()).unwrap();
        let reader = cache.snapshot();

        device
            .dirs
            .lock()
            .insert("\\DataFiles".into(), vec![entry(EntryKind::File, "new.rec")]);
        cache
            .rebuild_subtree(&device, "\\DataFiles", &exclusions())
            .unwrap();

        assert!(!reader.find("\\DataFiles").unwrap().scanned);
        assert_eq!(cache.find("\\DataFiles").unwrap().files[0].name, "new.rec");
    }
}
