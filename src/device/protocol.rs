//! Parsers for the text the puppy helper prints, plus remote path helpers.
//!
//! The helper speaks three output dialects:
//!
//! * `-c dir` prints one entry per line:
//!   `f   1234567 Mon Jan 01 20:30:00 2007 Some Show.rec`
//! * `-c size` prints a `Total` and a `Free` line, each with kiB, MiB and GiB
//!   columns.
//! * `-c get` / `-c put` overwrite a single progress record on stderr,
//!   separated by carriage returns:
//!   ` 42.00%,  2.20 Mbits/s, 00:01:10 elapsed, 0:01:36 remaining`

use serde::{Deserialize, Serialize};

pub const REMOTE_SEPARATOR: char = '\\';
pub const REMOTE_ROOT: &str = "\\";
/// Date format used in directory listings and in the file views.
pub const REMOTE_DATE_FORMAT: &str = "%a %b %d %Y";
pub const PARENT_DIR: &str = "..";

const NOT_FOUND_PREFIX: &str = "ERROR: Can not autodetect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Dir,
    File,
}

/// One line of a `-c dir` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub kind: EntryKind,
    pub name: String,
    /// Date in [`REMOTE_DATE_FORMAT`], time of day dropped.
    pub date: String,
    pub size: u64,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_parent(&self) -> bool {
        self.name == PARENT_DIR
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FreeSpace {
    pub total: u64,
    pub free: u64,
}

/// A single progress record from a running transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: f64,
    pub speed: String,
    pub elapsed: String,
    pub remaining: String,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        (self.percent / 100.0).clamp(0.0, 1.0)
    }
}

/// Split off `count` whitespace separated fields and return them with the
/// untouched remainder of the line.
fn split_fields(line: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = line.trim_start();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace)?;
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start();
    }
    Some((fields, rest))
}

pub fn parse_dir_line(line: &str) -> Option<RemoteEntry> {
    let (fields, name) = split_fields(line, 7)?;
    let name = name.trim_end_matches(['\r', '\n']);
    if name.is_empty() {
        return None;
    }

    let kind = match fields[0] {
        "d" => EntryKind::Dir,
        "f" => EntryKind::File,
        _ => return None,
    };
    let size = fields[1].parse().ok()?;
    // fields[5] is the time of day, which the views do not show
    let date = format!("{} {} {} {}", fields[2], fields[3], fields[4], fields[6]);

    Some(RemoteEntry {
        kind,
        name: name.to_string(),
        date,
        size,
    })
}

pub fn parse_dir_listing(output: &str) -> Vec<RemoteEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_dir_line(line);
            if entry.is_none() {
                tracing::debug!("Skipping unparsable listing line: {:?}", line);
            }
            entry
        })
        .collect()
}

/// Convert one `size` line to bytes using the largest non-zero unit column.
fn scaled_column(line: &str) -> Option<u64> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 7 {
        return None;
    }

    // Columns: label, kiB value, "kiB", MiB value, "MiB", GiB value, "GiB"
    let mut idx = 5;
    let mut value: f64 = fields[idx].parse().ok()?;
    while value < 1.0 && idx > 1 {
        idx -= 2;
        value = fields[idx].parse().ok()?;
    }

    let exponent = (idx / 2 + 1) as i32;
    Some((value * 1024f64.powi(exponent)) as u64)
}

pub fn parse_disk_space(output: &str) -> Option<FreeSpace> {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let total_line = lines
        .iter()
        .find(|l| l.trim_start().starts_with("Total"))
        .or_else(|| lines.first())?;
    let free_line = lines
        .iter()
        .find(|l| l.trim_start().starts_with("Free"))
        .or_else(|| lines.get(1))?;

    Some(FreeSpace {
        total: scaled_column(total_line)?,
        free: scaled_column(free_line)?,
    })
}

pub fn parse_progress(record: &str) -> Option<Progress> {
    let tokens: Vec<&str> = record.split(',').collect();
    if tokens.len() != 4 {
        return None;
    }

    let percent_field = tokens[0].trim();
    let percent = percent_field[..percent_field.rfind('%')?].trim().parse().ok()?;
    let elapsed = tokens[2].split_whitespace().next()?;
    let remaining = tokens[3].split_whitespace().next()?;

    Some(Progress {
        percent,
        speed: tokens[1].trim().to_string(),
        elapsed: elapsed.to_string(),
        remaining: remaining.to_string(),
    })
}

pub fn is_device_not_found(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.trim_start().starts_with(NOT_FOUND_PREFIX))
}

pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with(REMOTE_SEPARATOR) || name.starts_with(REMOTE_SEPARATOR) {
        format!("{}{}", dir, name)
    } else {
        format!("{}{}{}", dir, REMOTE_SEPARATOR, name)
    }
}

pub fn remote_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(REMOTE_SEPARATOR).filter(|c| !c.is_empty())
}

/// Normalise a remote path: collapse separators, resolve `.` and `..`,
/// always absolute.
pub fn normalize_remote(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in remote_components(path) {
        match component {
            "." => {}
            PARENT_DIR => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut normalized = String::from(REMOTE_ROOT);
    normalized.push_str(&parts.join(&REMOTE_SEPARATOR.to_string()));
    normalized
}

pub fn remote_basename(path: &str) -> &str {
    match path.rfind(REMOTE_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
d         0 Sat Jan 01 00:00:00 2000 ..
d         0 Tue Mar 06 21:10:12 2007 DataFiles
f 733741056 Mon Jan 01 20:30:00 2007 The  Late Show.rec
f      1024 Wed Feb 14 08:00:00 2007 a\\b.rec
";

    #[test]
    fn parses_listing_lines() {
        let entries = parse_dir_listing(LISTING);
        assert_eq!(entries.len(), 4);

        assert!(entries[0].is_parent());
        assert_eq!(entries[1].kind, EntryKind::Dir);
        assert_eq!(entries[1].name, "DataFiles");
        assert_eq!(entries[1].date, "Tue Mar 06 2007");

        assert_eq!(entries[2].kind, EntryKind::File);
        assert_eq!(entries[2].size, 733_741_056);
        assert_eq!(entries[2].name, "The  Late Show.rec");
        assert_eq!(entries[2].date, "Mon Jan 01 2007");

        assert_eq!(entries[3].name, "a\\b.rec");
    }

    #[test]
    fn skips_garbage_lines() {
        assert!(parse_dir_line("ERROR: Device reports Invalid command").is_none());
        assert!(parse_dir_line("f 12 Mon Jan 01 20:30:00 2007").is_none());
        assert!(parse_dir_line("x 12 Mon Jan 01 20:30:00 2007 name").is_none());
    }

    #[test]
    fn disk_space_uses_first_non_zero_column() {
        let output = "Total          0 kiB       0 MiB  120 GiB\n\
                      Free           0 kiB     500 MiB    0 GiB\n";
        let space = parse_disk_space(output).unwrap();
        assert_eq!(space.total, 120 * 1024 * 1024 * 1024);
        assert_eq!(space.free, 500 * 1024 * 1024);
    }

    #[test]
    fn disk_space_all_zero_is_zero() {
        let output = "Total 0 kiB 0 MiB 0 GiB\nFree 0 kiB 0 MiB 0 GiB\n";
        assert_eq!(parse_disk_space(output), Some(FreeSpace { total: 0, free: 0 }));
        assert_eq!(parse_disk_space("Total 12"), None);
    }

    #[test]
    fn parses_progress_record() {
        let progress =
            parse_progress(" 42.00%,  2.20 Mbits/s, 00:01:10 elapsed, 0:01:36 remaining").unwrap();
        assert_eq!(progress.percent, 42.0);
        assert_eq!(progress.speed, "2.20 Mbits/s");
        assert_eq!(progress.elapsed, "00:01:10");
        assert_eq!(progress.remaining, "0:01:36");
        assert!((progress.fraction() - 0.42).abs() < f64::EPSILON);

        assert!(parse_progress("\n").is_none());
        assert!(parse_progress("").is_none());
        assert!(parse_progress("ERROR: Device reports Invalid command\n").is_none());
    }

    #[test]
    fn recognises_missing_pvr() {
        assert!(is_device_not_found(
            "ERROR: Can not autodetect a Topfield TF5000PVRt\n"
        ));
        assert!(!is_device_not_found("ERROR: Device reports Invalid command"));
    }

    #[test]
    fn remote_paths() {
        assert_eq!(join_remote(REMOTE_ROOT, "MOVIES"), "\\MOVIES");
        assert_eq!(join_remote("\\MOVIES", "show.rec"), "\\MOVIES\\show.rec");
        assert_eq!(normalize_remote("\\MOVIES\\..\\DataFiles\\"), "\\DataFiles");
        assert_eq!(normalize_remote(""), "\\");
        assert_eq!(normalize_remote(".."), "\\");
        assert_eq!(remote_basename("\\MOVIES\\show.rec"), "show.rec");
        assert_eq!(
            remote_components("\\\\a\\b").collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }
}
