use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::size::{human_readable_size, size_sort_key};
use crate::device::protocol::{PARENT_DIR, REMOTE_DATE_FORMAT};
use crate::device::{EntryKind, RemoteEntry};

/// A row in one of the file panels. Date and size are display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub kind: EntryKind,
    pub name: String,
    pub date: String,
    pub size: String,
}

impl FileRow {
    pub fn parent() -> Self {
        Self {
            kind: EntryKind::Dir,
            name: PARENT_DIR.to_string(),
            date: String::new(),
            size: String::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_parent(&self) -> bool {
        self.is_dir() && self.name == PARENT_DIR
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.') && !self.is_parent()
    }

    /// Size in bytes as far as the display string allows.
    pub fn size_bytes(&self) -> u64 {
        super::size::convert_to_bytes(&self.size).unwrap_or(0)
    }
}

impl From<&RemoteEntry> for FileRow {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            kind: entry.kind,
            name: entry.name.clone(),
            date: entry.date.clone(),
            size: human_readable_size(entry.size),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    #[default]
    Name,
    Date,
    Size,
}

impl SortColumn {
    pub fn next(self) -> Self {
        match self {
            SortColumn::Name => SortColumn::Date,
            SortColumn::Date => SortColumn::Size,
            SortColumn::Size => SortColumn::Name,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortColumn::Name => "Name",
            SortColumn::Date => "Date",
            SortColumn::Size => "Size",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

pub fn parse_row_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), REMOTE_DATE_FORMAT).ok()
}

/// Local midnight of a `%a %b %d %Y` date, which is all the PVR reports.
pub fn local_midnight(date: &str) -> Option<DateTime<Local>> {
    let midnight = parse_row_date(date)?.and_hms_opt(0, 0, 0)?;
    Local.from_local_datetime(&midnight).earliest()
}

pub fn format_row_date(time: DateTime<Local>) -> String {
    time.format(REMOTE_DATE_FORMAT).to_string()
}

fn compare_names(a: &FileRow, b: &FileRow) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

fn compare_dates(a: &FileRow, b: &FileRow) -> Ordering {
    // Empty and unparsable dates (the ".." row) come first.
    parse_row_date(&a.date)
        .cmp(&parse_row_date(&b.date))
        .then_with(|| compare_names(a, b))
}

fn compare_sizes(a: &FileRow, b: &FileRow) -> Ordering {
    let key_a = size_sort_key(&a.size);
    let key_b = size_sort_key(&b.size);
    let by_size = match (key_a, key_b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some((wa, va)), Some((wb, vb))) => wa.cmp(&wb).then_with(|| va.total_cmp(&vb)),
    };
    by_size.then_with(|| compare_names(a, b))
}

/// Row ordering for the file panels: directories first (with ".." ahead of
/// all of them), then by `column`. `order` only flips the per-column
/// comparison.
pub fn compare_rows(a: &FileRow, b: &FileRow, column: SortColumn, order: SortOrder) -> Ordering {
    match (a.kind, b.kind) {
        (EntryKind::Dir, EntryKind::File) => return Ordering::Less,
        (EntryKind::File, EntryKind::Dir) => return Ordering::Greater,
        _ => {}
    }

    match (a.is_parent(), b.is_parent()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => return Ordering::Equal,
        _ => {}
    }

    let ordering = match column {
        SortColumn::Name => compare_names(a, b),
        SortColumn::Date => compare_dates(a, b),
        SortColumn::Size => compare_sizes(a, b),
    };

    match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    }
}

pub fn sort_rows(rows: &mut [FileRow], column: SortColumn, order: SortOrder) {
    rows.sort_by(|a, b| compare_rows(a, b, column, order));
}
