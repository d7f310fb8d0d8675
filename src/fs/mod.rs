//! The two filesystem views: the computer and the PVR.

pub mod entry;
mod local;
mod remote;
pub mod size;

pub use entry::{compare_rows, sort_rows, FileRow, SortColumn, SortOrder};
pub use local::LocalFilesystem;
pub use remote::{update_cache, RemoteFilesystem};
pub use size::human_readable_size;

const NEW_FOLDER_NAME: &str = "untitled folder";

/// First free name of the form `untitled folder`, `untitled folder 1`, ...
pub fn untitled_folder_name(exists: impl Fn(&str) -> bool) -> String {
    let mut name = NEW_FOLDER_NAME.to_string();
    let mut count = 1;
    while exists(&name) {
        name = format!("{} {}", NEW_FOLDER_NAME, count);
        count += 1;
    }
    name
}

/// Rows to show, with a `..` entry on top when `with_parent` is set.
pub fn visible_rows(
    rows: impl IntoIterator<Item = FileRow>,
    with_parent: bool,
    show_hidden: bool,
) -> Vec<FileRow> {
    let mut visible: Vec<FileRow> = Vec::new();
    if with_parent {
        visible.push(FileRow::parent());
    }
    visible.extend(
        rows.into_iter()
            .filter(|row| !row.is_parent())
            .filter(|row| show_hidden || !row.is_hidden()),
    );
    visible
}
