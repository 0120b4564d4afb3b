//! Durable trace records and liveness markers.
//!
//! A trace lives in the user-scoped home (`traces/<id>.json`) so it survives
//! the project directory. Its liveness marker lives in the project
//! (`.warden/active/<role>--<session>.json`); one marker per (role, session)
//! is enforced by the file name alone. A trace is mutated exactly once, when
//! it leaves `active`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::outcome::{self, Evidence, Signal};
use crate::core::types::{Outcome, Role, TraceStatus};
use crate::io::paths::{WardenPaths, sanitize};
use crate::io::state_store::write_atomic;

/// File inside a trace's evidence directory holding an explicit `pass`/`fail`.
pub const RESULT_FILE: &str = "result";
/// Excerpt of the run's final output, written after finalization.
pub const TRANSCRIPT_FILE: &str = "transcript.txt";

const TRANSCRIPT_EXCERPT_CHARS: usize = 4_000;

/// Durable record of one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub role: Role,
    pub session: String,
    /// Project root the run belonged to.
    pub project: String,
    pub branch: Option<String>,
    pub started_at: String,
    pub started_epoch: u64,
    pub status: TraceStatus,
    pub outcome: Outcome,
    pub finished_at: Option<String>,
    pub duration_secs: Option<u64>,
    #[serde(default)]
    pub artifact_refs: Vec<String>,
    pub evidence_dir: String,
    #[serde(default)]
    pub work_area: Option<String>,
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Whether the work tree had uncommitted changes when the run started.
    #[serde(default)]
    pub dirty_at_start: Option<bool>,
}

/// Liveness marker contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MarkerFile {
    trace_id: String,
    role: Role,
    session: String,
    started_epoch: u64,
}

/// A liveness marker found on disk.
///
/// Corrupt markers are still reported (with `trace_id: None`) so the orphan
/// sweep can remove them; role and session then come from the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMarker {
    pub path: PathBuf,
    pub role: Role,
    pub session: String,
    pub trace_id: Option<String>,
    pub started_epoch: u64,
}

impl ActiveMarker {
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_epoch)
    }
}

/// Parameters for [`start_trace`].
#[derive(Debug, Clone)]
pub struct StartTrace<'a> {
    pub role: &'a Role,
    pub session: &'a str,
    pub branch: Option<&'a str>,
    pub work_area: Option<&'a Path>,
    /// Git object recording the working state when the run started.
    pub checkpoint: Option<&'a str>,
    pub dirty: Option<bool>,
}

/// What a finished run handed back.
#[derive(Debug, Clone, Default)]
pub struct RunReport<'a> {
    pub output: Option<&'a str>,
    pub artifacts: &'a [String],
}

pub fn rfc3339(epoch: u64) -> String {
    let secs = i64::try_from(epoch).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn new_trace_id(role: &Role, now: u64) -> String {
    let secs = i64::try_from(now).unwrap_or(i64::MAX);
    let stamp = DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .format("%Y%m%dT%H%M%SZ");
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("{stamp}-{}-{suffix:08x}", sanitize(role.as_str()))
}

/// Create an active trace plus its liveness marker.
///
/// A marker already held by the same (role, session) belongs to a run that
/// never finalized; its trace is closed as crashed first.
#[instrument(skip_all, fields(role = %request.role, session = request.session))]
pub fn start_trace(paths: &WardenPaths, request: &StartTrace<'_>, now: u64) -> Result<TraceRecord> {
    if let Some(previous) = find_marker(paths, request.role, request.session) {
        warn!(
            marker = %previous.path.display(),
            "replacing unfinalized marker for the same run slot"
        );
        crash_marker(paths, &previous, now)?;
    }

    let id = new_trace_id(request.role, now);
    let evidence_dir = paths.evidence_dir_for(&id);
    fs::create_dir_all(&evidence_dir)
        .with_context(|| format!("create evidence dir {}", evidence_dir.display()))?;

    let record = TraceRecord {
        id: id.clone(),
        role: request.role.clone(),
        session: request.session.to_string(),
        project: paths.root.to_string_lossy().into_owned(),
        branch: request.branch.map(str::to_string),
        started_at: rfc3339(now),
        started_epoch: now,
        status: TraceStatus::Active,
        outcome: Outcome::Unknown,
        finished_at: None,
        duration_secs: None,
        artifact_refs: Vec::new(),
        evidence_dir: evidence_dir.to_string_lossy().into_owned(),
        work_area: request
            .work_area
            .map(|p| p.to_string_lossy().into_owned()),
        checkpoint: request.checkpoint.map(str::to_string),
        dirty_at_start: request.dirty,
    };
    write_trace(paths, &record)?;

    let marker = MarkerFile {
        trace_id: id,
        role: request.role.clone(),
        session: request.session.to_string(),
        started_epoch: now,
    };
    let marker_path = paths.marker_path(request.role, request.session);
    write_json(&marker_path, &marker)?;
    debug!(trace_id = %record.id, marker = %marker_path.display(), "trace started");
    Ok(record)
}

pub fn write_trace(paths: &WardenPaths, record: &TraceRecord) -> Result<()> {
    write_json(&paths.trace_path(&record.id), record)
}

/// Load a trace; missing or corrupt records are `None`.
pub fn load_trace(paths: &WardenPaths, id: &str) -> Option<TraceRecord> {
    let path = paths.trace_path(id);
    let contents = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "corrupt trace record");
            None
        }
    }
}

/// Close an active trace with an evidence-derived outcome and drop its marker.
///
/// Finalizing an already-final trace returns it unchanged.
#[instrument(skip_all, fields(trace_id = id))]
pub fn finalize_trace(
    paths: &WardenPaths,
    id: &str,
    report: &RunReport<'_>,
    timeout_secs: u64,
    now: u64,
) -> Result<Option<TraceRecord>> {
    let Some(mut record) = load_trace(paths, id) else {
        warn!("no trace to finalize");
        return Ok(None);
    };
    if record.status != TraceStatus::Active {
        debug!(status = ?record.status, "trace already final");
        remove_marker_for(paths, &record)?;
        return Ok(Some(record));
    }

    let evidence = collect_evidence(&record, report, now);
    record.outcome = outcome::classify(&evidence, timeout_secs);
    record.status = TraceStatus::Completed;
    record.finished_at = Some(rfc3339(now));
    record.duration_secs = Some(evidence.duration_secs);
    record.artifact_refs = evidence.artifact_refs;
    write_trace(paths, &record)?;
    remove_marker_for(paths, &record)?;
    debug!(outcome = %record.outcome, artifacts = record.artifact_refs.len(), "trace finalized");
    Ok(Some(record))
}

fn collect_evidence(record: &TraceRecord, report: &RunReport<'_>, now: u64) -> Evidence {
    let evidence_dir = Path::new(&record.evidence_dir);
    let mut artifact_refs = list_artifacts(evidence_dir);
    artifact_refs.extend(
        report
            .artifacts
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned(),
    );

    let file_signal = fs::read_to_string(evidence_dir.join(RESULT_FILE))
        .ok()
        .and_then(|raw| Signal::parse(&raw));
    let signal = file_signal.or_else(|| report.output.and_then(outcome::parse_result_line));

    Evidence {
        signal,
        artifact_refs,
        duration_secs: now.saturating_sub(record.started_epoch),
    }
}

fn list_artifacts(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| !name.starts_with('.'))
        .map(|name| dir.join(name).to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Close the trace behind `marker` as crashed and remove the marker.
#[instrument(skip_all, fields(marker = %marker.path.display()))]
pub fn crash_marker(
    paths: &WardenPaths,
    marker: &ActiveMarker,
    now: u64,
) -> Result<Option<TraceRecord>> {
    let record = marker
        .trace_id
        .as_deref()
        .and_then(|id| load_trace(paths, id));
    let finalized = match record {
        Some(mut record) if record.status == TraceStatus::Active => {
            record.status = TraceStatus::Crashed;
            record.outcome = Outcome::Crashed;
            record.finished_at = Some(rfc3339(now));
            record.duration_secs = Some(now.saturating_sub(record.started_epoch));
            write_trace(paths, &record)?;
            Some(record)
        }
        _ => None,
    };
    remove_file(&marker.path)?;
    Ok(finalized)
}

fn remove_marker_for(paths: &WardenPaths, record: &TraceRecord) -> Result<()> {
    let path = paths.marker_path(&record.role, &record.session);
    // The slot may already hold a newer run's marker.
    if let Some(marker) = read_marker(&path) {
        if marker.trace_id.as_deref().is_some_and(|id| id != record.id) {
            return Ok(());
        }
    }
    remove_file(&path)
}

/// All liveness markers in the project, oldest first.
pub fn active_markers(paths: &WardenPaths) -> Vec<ActiveMarker> {
    let Ok(entries) = fs::read_dir(&paths.active_dir) else {
        return Vec::new();
    };
    let mut markers: Vec<ActiveMarker> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|path| read_marker(&path))
        .collect();
    markers.sort_by(|a, b| {
        a.started_epoch
            .cmp(&b.started_epoch)
            .then_with(|| a.path.cmp(&b.path))
    });
    markers
}

pub fn find_marker(paths: &WardenPaths, role: &Role, session: &str) -> Option<ActiveMarker> {
    read_marker(&paths.marker_path(role, session))
}

fn read_marker(path: &Path) -> Option<ActiveMarker> {
    let contents = fs::read_to_string(path).ok()?;
    if let Ok(file) = serde_json::from_str::<MarkerFile>(&contents) {
        return Some(ActiveMarker {
            path: path.to_path_buf(),
            role: file.role,
            session: file.session,
            trace_id: Some(file.trace_id),
            started_epoch: file.started_epoch,
        });
    }

    warn!(path = %path.display(), "corrupt liveness marker");
    let stem = path.file_stem()?.to_str()?;
    let (role, session) = stem.split_once("--")?;
    // Unknown start time: age it from the file's mtime.
    let started_epoch = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Some(ActiveMarker {
        path: path.to_path_buf(),
        role: Role::from(role),
        session: session.to_string(),
        trace_id: None,
        started_epoch,
    })
}

/// Summary line appended to the cross-project index.
#[derive(Debug, Serialize)]
struct IndexEntry<'a> {
    id: &'a str,
    role: &'a Role,
    session: &'a str,
    project: &'a str,
    status: TraceStatus,
    outcome: Outcome,
    started_at: &'a str,
    finished_at: Option<&'a str>,
    duration_secs: Option<u64>,
}

/// Append one JSON line for a final trace to `traces/index.jsonl`.
pub fn append_index(paths: &WardenPaths, record: &TraceRecord) -> Result<()> {
    let entry = IndexEntry {
        id: &record.id,
        role: &record.role,
        session: &record.session,
        project: &record.project,
        status: record.status,
        outcome: record.outcome,
        started_at: &record.started_at,
        finished_at: record.finished_at.as_deref(),
        duration_secs: record.duration_secs,
    };
    let mut line = serde_json::to_string(&entry).context("serialize index entry")?;
    line.push('\n');
    fs::create_dir_all(&paths.traces_dir)
        .with_context(|| format!("create directory {}", paths.traces_dir.display()))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.index_path)
        .with_context(|| format!("open {}", paths.index_path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", paths.index_path.display()))?;
    Ok(())
}

/// Save an excerpt of the run's final output next to its evidence.
///
/// Runs after finalization only; files written here never change an outcome
/// that has already been recorded.
pub fn write_transcript_excerpt(record: &TraceRecord, output: &str) -> Result<()> {
    if output.trim().is_empty() {
        return Ok(());
    }
    let chars: Vec<char> = output.chars().collect();
    let start = chars.len().saturating_sub(TRANSCRIPT_EXCERPT_CHARS);
    let excerpt: String = chars[start..].iter().collect();
    let path = Path::new(&record.evidence_dir).join(TRANSCRIPT_FILE);
    write_atomic(&path, &excerpt)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> (tempfile::TempDir, WardenPaths) {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WardenPaths::new(temp.path().join("repo"), temp.path().join("home"));
        (temp, paths)
    }

    fn start(paths: &WardenPaths, role: &Role, session: &str, now: u64) -> TraceRecord {
        start_trace(
            paths,
            &StartTrace {
                role,
                session,
                branch: Some("feature/x"),
                work_area: None,
                checkpoint: None,
                dirty: None,
            },
            now,
        )
        .expect("start")
    }

    #[test]
    fn start_writes_record_and_marker() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);

        assert_eq!(record.status, TraceStatus::Active);
        assert_eq!(load_trace(&paths, &record.id), Some(record.clone()));
        let markers = active_markers(&paths);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].trace_id.as_deref(), Some(record.id.as_str()));
        assert_eq!(markers[0].role, Role::Verifier);
        assert!(Path::new(&record.evidence_dir).is_dir());
    }

    #[test]
    fn finalize_without_artifacts_is_skipped_and_removes_marker() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);
        let done = finalize_trace(&paths, &record.id, &RunReport::default(), 1_800, 160)
            .expect("finalize")
            .expect("record");
        assert_eq!(done.status, TraceStatus::Completed);
        assert_eq!(done.outcome, Outcome::Skipped);
        assert_eq!(done.duration_secs, Some(60));
        assert!(active_markers(&paths).is_empty());
    }

    #[test]
    fn result_file_is_an_explicit_signal() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);
        fs::write(Path::new(&record.evidence_dir).join(RESULT_FILE), "fail\n").expect("write");
        let done = finalize_trace(&paths, &record.id, &RunReport::default(), 1_800, 110)
            .expect("finalize")
            .expect("record");
        assert_eq!(done.outcome, Outcome::Failure);
        assert_eq!(done.artifact_refs.len(), 1);
    }

    #[test]
    fn output_result_line_and_artifacts_classify() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);
        let artifacts = vec!["logs/test.txt".to_string()];
        let report = RunReport {
            output: Some("ran suite\nRESULT: PASS"),
            artifacts: &artifacts,
        };
        let done = finalize_trace(&paths, &record.id, &report, 1_800, 110)
            .expect("finalize")
            .expect("record");
        assert_eq!(done.outcome, Outcome::Success);
        assert_eq!(done.artifact_refs, artifacts);
    }

    #[test]
    fn finalize_twice_keeps_first_outcome() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);
        let first = finalize_trace(&paths, &record.id, &RunReport::default(), 1_800, 110)
            .expect("finalize")
            .expect("record");
        write_transcript_excerpt(&first, "late output\nRESULT: PASS").expect("enrich");

        let report = RunReport {
            output: Some("RESULT: PASS"),
            artifacts: &[],
        };
        let second = finalize_trace(&paths, &record.id, &report, 1_800, 999)
            .expect("finalize")
            .expect("record");
        assert_eq!(second, first);
        assert_eq!(second.outcome, Outcome::Skipped);
    }

    #[test]
    fn crash_marker_closes_trace_and_removes_marker() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Implementer, "s1", 100);
        let marker = find_marker(&paths, &Role::Implementer, "s1").expect("marker");
        let crashed = crash_marker(&paths, &marker, 10_000)
            .expect("crash")
            .expect("record");
        assert_eq!(crashed.status, TraceStatus::Crashed);
        assert_eq!(crashed.outcome, Outcome::Crashed);
        assert!(find_marker(&paths, &Role::Implementer, "s1").is_none());
        assert_eq!(load_trace(&paths, &record.id), Some(crashed));
    }

    #[test]
    fn corrupt_marker_is_still_listed() {
        let (_temp, paths) = paths();
        let path = paths.marker_path(&Role::Reviewer, "s9");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{not json").expect("write");
        let markers = active_markers(&paths);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].role, Role::Reviewer);
        assert_eq!(markers[0].session, "s9");
        assert_eq!(markers[0].trace_id, None);
    }

    #[test]
    fn restarting_a_slot_crashes_the_previous_run() {
        let (_temp, paths) = paths();
        let first = start(&paths, &Role::Verifier, "s1", 100);
        let second = start(&paths, &Role::Verifier, "s1", 200);
        assert_eq!(
            load_trace(&paths, &first.id).map(|r| r.status),
            Some(TraceStatus::Crashed)
        );
        let markers = active_markers(&paths);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].trace_id.as_deref(), Some(second.id.as_str()));
    }

    #[test]
    fn index_is_append_only_jsonl() {
        let (_temp, paths) = paths();
        let record = start(&paths, &Role::Verifier, "s1", 100);
        let done = finalize_trace(&paths, &record.id, &RunReport::default(), 1_800, 110)
            .expect("finalize")
            .expect("record");
        append_index(&paths, &done).expect("append");
        append_index(&paths, &done).expect("append");
        let contents = fs::read_to_string(&paths.index_path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(value["outcome"], "skipped");
        assert_eq!(value["id"], done.id.as_str());
    }

    #[test]
    fn rfc3339_formats_epoch() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00Z");
    }
}
