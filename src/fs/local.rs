use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

use super::entry::{format_row_date, FileRow};
use super::size::human_readable_size;
use super::untitled_folder_name;
use crate::device::{EntryKind, FreeSpace};
use crate::error::{Error, Result};

/// Collapse `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn row_for(name: String, metadata: &fs::Metadata) -> FileRow {
    let date = metadata
        .modified()
        .map(|time| format_row_date(time.into()))
        .unwrap_or_default();

    if metadata.is_dir() {
        FileRow {
            kind: EntryKind::Dir,
            name,
            date,
            size: String::new(),
        }
    } else {
        FileRow {
            kind: EntryKind::File,
            name,
            date,
            size: human_readable_size(metadata.len()),
        }
    }
}

/// The computer side of the file manager.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    current_dir: PathBuf,
}

impl LocalFilesystem {
    /// Start in `dir`, or in the home directory when `dir` is unusable.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let current_dir = if dir.is_dir() {
            normalize(dir)
        } else {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
        };
        Self { current_dir }
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn abspath(&self, name: &str) -> PathBuf {
        self.current_dir.join(name)
    }

    pub fn has_parent(&self) -> bool {
        self.current_dir.parent().is_some()
    }

    /// Change to `dir`, relative to the current directory unless absolute.
    pub fn change_dir(&mut self, dir: &str) -> Result<()> {
        let target = normalize(&self.current_dir.join(dir));
        if !target.is_dir() {
            return Err(Error::local_io(
                target,
                io::Error::new(io::ErrorKind::NotFound, "No such directory"),
            ));
        }
        debug!("Local directory is now {}", target.display());
        self.current_dir = target;
        Ok(())
    }

    /// Entries of the current directory, without `..`.
    pub fn list(&self) -> Result<Vec<FileRow>> {
        let entries =
            fs::read_dir(&self.current_dir).map_err(|e| Error::local_io(&self.current_dir, e))?;

        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::local_io(&self.current_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follow symlinks so linked directories can be entered.
            match fs::metadata(entry.path()) {
                Ok(metadata) => rows.push(row_for(name, &metadata)),
                Err(e) => debug!("Skipping {}: {}", entry.path().display(), e),
            }
        }
        Ok(rows)
    }

    pub fn exists(&self, name: &str) -> bool {
        fs::symlink_metadata(self.abspath(name)).is_ok()
    }

    pub fn find(&self, name: &str) -> Option<FileRow> {
        let metadata = fs::metadata(self.abspath(name)).ok()?;
        Some(row_for(name.to_string(), &metadata))
    }

    /// Size in bytes and date of a file in the current directory.
    pub fn file_info(&self, name: &str) -> Result<(u64, String)> {
        let path = self.abspath(name);
        let metadata = fs::metadata(&path).map_err(|e| Error::local_io(&path, e))?;
        let row = row_for(name.to_string(), &metadata);
        Ok((metadata.len(), row.date))
    }

    /// Delete a file, or a directory with everything in it.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.abspath(name);
        let metadata = fs::symlink_metadata(&path).map_err(|e| Error::local_io(&path, e))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| Error::local_io(&path, e))
    }

    /// Rename `old` to `new`. An existing `new` is only replaced with
    /// `overwrite`, otherwise the result is `NameConflict`.
    pub fn rename(&self, old: &str, new: &str, overwrite: bool) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.exists(new) {
            if !overwrite {
                return Err(Error::NameConflict(new.to_string()));
            }
            if self.abspath(new).is_dir() {
                self.delete(new)?;
            }
        }

        let from = self.abspath(old);
        fs::rename(&from, self.abspath(new)).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => Error::NameConflict(new.to_string()),
            _ => Error::local_io(from, e),
        })
    }

    /// Create a new, uniquely named folder and return its name.
    pub fn mkdir(&self) -> Result<String> {
        let name = untitled_folder_name(|name| self.exists(name));
        let path = self.abspath(&name);
        fs::create_dir(&path).map_err(|e| Error::local_io(&path, e))?;
        Ok(name)
    }

    /// Space on the disk holding the current directory.
    pub fn free_space(&self) -> Option<FreeSpace> {
        let disks = Disks::new_with_refreshed_list();

        // The disk with the longest matching mount point holds the directory.
        disks
            .iter()
            .filter(|disk| self.current_dir.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| FreeSpace {
                total: disk.total_space(),
                free: disk.available_space(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> (tempfile::TempDir, LocalFilesystem) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("show.rec"), vec![0u8; 2048]).unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(dir.path().join("MOVIES")).unwrap();
        let view = LocalFilesystem::new(dir.path());
        (dir, view)
    }

    #[test]
    fn lists_current_directory() {
        let (_dir, view) = populated();
        let mut rows = view.list().unwrap();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![".hidden", "MOVIES", "show.rec"]);
        assert!(rows[1].is_dir());
        assert_eq!(rows[1].size, "");
        assert_eq!(rows[2].size, "2.0 KB");
        assert!(!rows[2].date.is_empty());
    }

    #[test]
    fn changes_directory() {
        let (dir, mut view) = populated();
        view.change_dir("MOVIES").unwrap();
        assert_eq!(view.current_dir(), dir.path().join("MOVIES"));
        view.change_dir("..").unwrap();
        assert_eq!(view.current_dir(), dir.path());
        assert!(view.change_dir("nowhere").is_err());
        assert_eq!(view.current_dir(), dir.path());
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let (_dir, view) = populated();
        fs::write(view.abspath("other.rec"), b"other").unwrap();

        let err = view.rename("show.rec", "other.rec", false).unwrap_err();
        assert!(matches!(err, Error::NameConflict(ref name) if name == "other.rec"));
        assert!(view.exists("show.rec"));

        view.rename("show.rec", "other.rec", true).unwrap();
        assert!(!view.exists("show.rec"));
        assert_eq!(fs::metadata(view.abspath("other.rec")).unwrap().len(), 2048);

        // Renaming onto itself is a no-op.
        view.rename("other.rec", "other.rec", false).unwrap();
    }

    #[test]
    fn mkdir_picks_free_name() {
        let (_dir, view) = populated();
        assert_eq!(view.mkdir().unwrap(), "untitled folder");
        assert_eq!(view.mkdir().unwrap(), "untitled folder 1");
        assert!(view.abspath("untitled folder 1").is_dir());
    }

    #[test]
    fn deletes_files_and_directories() {
        let (_dir, view) = populated();
        fs::write(view.abspath("MOVIES").join("film.rec"), b"film").unwrap();

        view.delete("MOVIES").unwrap();
        view.delete("show.rec").unwrap();
        assert!(!view.exists("MOVIES"));
        assert!(!view.exists("show.rec"));
        assert!(matches!(view.delete("show.rec"), Err(Error::LocalIo { .. })));
    }

    #[test]
    fn file_info_reports_size() {
        let (_dir, view) = populated();
        let (size, date) = view.file_info("show.rec").unwrap();
        assert_eq!(size, 2048);
        assert!(crate::fs::entry::parse_row_date(&date).is_some());
    }
}
