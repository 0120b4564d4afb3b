//! Startup reconciliation: the single place crash recovery happens.
//!
//! Runs once per session start. Liveness markers older than the orphan
//! threshold belong to runs that never finalized; they are closed as crashed
//! and removed so they cannot block dependent dispatches forever.

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::types::Role;
use crate::io::breadcrumb;
use crate::io::config::WardenConfig;
use crate::io::paths::WardenPaths;
use crate::io::trace_store::{self, active_markers, crash_marker};

/// A marker the sweep reclassified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptRun {
    pub role: Role,
    pub session: String,
    pub trace_id: Option<String>,
    pub age_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub swept: Vec<SweptRun>,
    /// Markers young enough to still belong to a live run.
    pub live: usize,
    /// A breadcrumb pointing at a deleted work area was removed.
    pub cleared_breadcrumb: bool,
}

/// Sweep orphaned liveness markers for the project.
#[instrument(skip_all, fields(root = %paths.root.display()))]
pub fn reconcile(paths: &WardenPaths, cfg: &WardenConfig, now: u64) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for marker in active_markers(paths) {
        let age_secs = marker.age_secs(now);
        if age_secs <= cfg.orphan_threshold_secs {
            report.live += 1;
            continue;
        }
        warn!(
            role = %marker.role,
            session = %marker.session,
            age_secs,
            "orphaned run, reclassifying as crashed"
        );
        if let Some(record) = crash_marker(paths, &marker, now)? {
            if let Err(err) = trace_store::append_index(paths, &record) {
                warn!(trace_id = %record.id, err = %err, "index append failed");
            }
        }
        report.swept.push(SweptRun {
            role: marker.role,
            session: marker.session,
            trace_id: marker.trace_id,
            age_secs,
        });
    }

    if let Some(target) = breadcrumb::read(paths) {
        if !target.exists() {
            breadcrumb::clear(paths)?;
            report.cleared_breadcrumb = true;
            debug!(target = %target.display(), "cleared breadcrumb to missing work area");
        }
    }

    debug!(swept = report.swept.len(), live = report.live, "reconcile finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TraceStatus;
    use crate::io::trace_store::{StartTrace, load_trace, start_trace};

    fn paths() -> (tempfile::TempDir, WardenPaths) {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WardenPaths::new(temp.path().join("repo"), temp.path().join("home"));
        (temp, paths)
    }

    fn start(paths: &WardenPaths, role: Role, now: u64) -> String {
        start_trace(
            paths,
            &StartTrace {
                role: &role,
                session: "s1",
                branch: None,
                work_area: None,
                checkpoint: None,
                dirty: None,
            },
            now,
        )
        .expect("start")
        .id
    }

    #[test]
    fn old_markers_are_crashed_and_young_ones_kept() {
        let (_temp, paths) = paths();
        let cfg = WardenConfig::default();
        let old = start(&paths, Role::Implementer, 0);
        start(&paths, Role::Verifier, 10_000);

        let report = reconcile(&paths, &cfg, 10_100).expect("reconcile");
        assert_eq!(report.swept.len(), 1);
        assert_eq!(report.swept[0].role, Role::Implementer);
        assert_eq!(report.live, 1);
        assert_eq!(
            load_trace(&paths, &old).map(|r| r.status),
            Some(TraceStatus::Crashed)
        );
        assert_eq!(active_markers(&paths).len(), 1);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let (_temp, paths) = paths();
        let cfg = WardenConfig::default();
        start(&paths, Role::Implementer, 0);
        assert_eq!(reconcile(&paths, &cfg, 9_000).expect("first").swept.len(), 1);
        assert_eq!(reconcile(&paths, &cfg, 9_000).expect("second"), ReconcileReport::default());
    }

    #[test]
    fn breadcrumb_to_missing_work_area_is_cleared() {
        let (temp, paths) = paths();
        breadcrumb::write(&paths, &temp.path().join("gone"), 1).expect("write");
        let report = reconcile(&paths, &WardenConfig::default(), 2).expect("reconcile");
        assert!(report.cleared_breadcrumb);
        assert_eq!(breadcrumb::read(&paths), None);
    }
}
