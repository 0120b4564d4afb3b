//! Atomic state store for single-line records.
//!
//! Writers go through a uniquely named temp file in the target directory and
//! rename over the target, so concurrent readers see either the old record or
//! the new one. Readers never fail: anything missing or malformed reads as
//! absent.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::record::{RecordRead, RecordValue, StateRecord, classify_read};

/// Wall-clock seconds since the Unix epoch.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write `contents` to `path` via temp file + rename. Creates parent directories.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

pub fn write(path: &Path, record: &StateRecord) -> Result<()> {
    debug!(
        path = %path.display(),
        value = %record.value,
        epoch = record.epoch,
        "writing state record"
    );
    write_atomic(path, &record.encode())
}

/// Read raw text. Missing or unreadable files are `None`.
pub fn read_raw(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(
                path = %path.display(),
                err = %err,
                "unreadable state record, treating as absent"
            );
            None
        }
    }
}

/// Decoded record, or `None` when missing, empty, or shape-invalid.
pub fn read(path: &Path) -> Option<StateRecord> {
    let raw = read_raw(path)?;
    let record = StateRecord::decode(&raw);
    if record.is_none() && !raw.trim().is_empty() {
        warn!(path = %path.display(), "corrupt state record, treating as absent");
    }
    record
}

/// Typed read against an optional staleness window.
pub fn read_classified<V: RecordValue>(
    path: &Path,
    now: u64,
    max_age_secs: Option<u64>,
) -> RecordRead<V> {
    let raw = read_raw(path);
    let read = classify_read(raw.as_deref(), now, max_age_secs);
    match &read {
        RecordRead::Corrupt => {
            warn!(path = %path.display(), "corrupt state record, treating as absent");
        }
        RecordRead::Stale { epoch, .. } => {
            debug!(path = %path.display(), epoch, "stale state record, treating as absent");
        }
        _ => {}
    }
    read
}

/// Typed value if present, well-formed, and (when a window is given) fresh.
pub fn read_value<V: RecordValue>(path: &Path, now: u64, max_age_secs: Option<u64>) -> Option<V> {
    read_classified(path, now, max_age_secs).into_fresh()
}

pub fn write_value<V: RecordValue>(path: &Path, value: &V, now: u64) -> Result<()> {
    write(path, &StateRecord::new(value.encode(), now))
}

/// Remove a record. Missing is not an error.
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// Entries under `.warden/` that are machine state, never committed.
const IGNORED_STATE: [&str; 4] = ["active/", "evidence/", "state/", "status.json"];

/// Make sure `.warden/.gitignore` lists every machine-state entry, keeping
/// lines a user added. Rewrites only when something is missing.
pub fn ensure_gitignore(path: &Path) -> Result<()> {
    let existing = read_raw(path).unwrap_or_default();
    let mut lines: Vec<String> = existing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    let before = lines.len();
    for entry in IGNORED_STATE {
        if !lines.iter().any(|line| line == entry) {
            lines.push(entry.to_string());
        }
    }
    if lines.len() == before {
        return Ok(());
    }
    lines.sort();
    let mut contents = lines.join("\n");
    contents.push('\n');
    write_atomic(path, &contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GateState, TestStatus};

    #[test]
    fn write_then_read_round_trips_value_and_epoch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/gate");
        let record = StateRecord::new("pending", 1_700_000_000).with_extra("feature/x");

        write(&path, &record).expect("write");
        assert_eq!(read(&path), Some(record));
    }

    #[test]
    fn write_creates_parent_and_leaves_no_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("a/b/test-status");
        write_value(&path, &TestStatus::Pass, 10).expect("write");
        let entries: Vec<_> = fs::read_dir(temp.path().join("a/b"))
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("test-status")]);
    }

    #[test]
    fn corrupt_and_truncated_records_read_as_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gate");
        for contents in [
            "verified",
            "verified|",
            "verified|12x",
            "",
            "{\"value\":\"verified\"",
            "\u{0}\u{0}",
        ] {
            fs::write(&path, contents).expect("write");
            assert_eq!(read_value::<GateState>(&path, 100, None), None, "{contents:?}");
        }
    }

    #[test]
    fn stale_record_reads_as_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("test-status");
        write_value(&path, &TestStatus::Pass, 1_000).expect("write");

        assert_eq!(read_value::<TestStatus>(&path, 1_900, Some(900)), Some(TestStatus::Pass));
        assert_eq!(read_value::<TestStatus>(&path, 1_901, Some(900)), None);
        assert!(matches!(
            read_classified::<TestStatus>(&path, 1_901, Some(900)),
            RecordRead::Stale { .. }
        ));
    }

    #[test]
    fn remove_missing_is_ok() {
        let temp = tempfile::tempdir().expect("tempdir");
        remove(&temp.path().join("nope")).expect("remove");
    }

    #[test]
    fn gitignore_keeps_user_lines_and_adds_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".warden/.gitignore");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "scratch/\nstate/\n").expect("write");

        ensure_gitignore(&path).expect("ensure");
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "active/\nevidence/\nscratch/\nstate/\nstatus.json\n"
        );
        ensure_gitignore(&path).expect("ensure again");
    }
}
