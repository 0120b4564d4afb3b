//! Breadcrumb indirection for work routed into a secondary work area.
//!
//! Lookups are two steps: [`resolve`] picks the authoritative path for a
//! concern, then the caller reads that path through the state store. The
//! breadcrumb is consulted, never consumed; it goes stale on its own once its
//! target disappears or the target's gate is no longer in flight.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::core::record::StateRecord;
use crate::io::gate_store;
use crate::io::paths::WardenPaths;
use crate::io::state_store;

const BREADCRUMB_VALUE: &str = "work-area";

/// State whose authoritative copy may live in a secondary work area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    /// The verification gate record.
    Gate,
    /// Where to send a shell whose working directory is going away.
    RecoveryDir,
}

/// Point the project at `work_area`.
pub fn write(paths: &WardenPaths, work_area: &Path, now: u64) -> Result<()> {
    let record = StateRecord::new(BREADCRUMB_VALUE, now).with_extra(work_area.to_string_lossy());
    state_store::write(&paths.breadcrumb_path, &record)
}

/// Breadcrumb target, if a well-formed breadcrumb exists.
pub fn read(paths: &WardenPaths) -> Option<PathBuf> {
    let record = state_store::read(&paths.breadcrumb_path)?;
    if record.value != BREADCRUMB_VALUE {
        return None;
    }
    record
        .extra
        .filter(|target| !target.trim().is_empty())
        .map(PathBuf::from)
}

pub fn clear(paths: &WardenPaths) -> Result<()> {
    state_store::remove(&paths.breadcrumb_path)
}

/// Work area the breadcrumb points at, if it is still live.
///
/// Live means the target exists and its own gate copy is in flight.
pub fn live_target(paths: &WardenPaths) -> Option<WardenPaths> {
    let target = read(paths)?;
    if !target.is_dir() {
        debug!(target = %target.display(), "breadcrumb target is gone");
        return None;
    }
    let target_paths = WardenPaths::new(&target, &paths.home_dir);
    let gate_path = canonical_gate_path(&target_paths);
    let gate = gate_store::read_state(&gate_path);
    if !gate.is_in_flight() {
        debug!(target = %target.display(), gate = %gate, "breadcrumb target is not in flight");
        return None;
    }
    Some(target_paths)
}

/// Authoritative path for `concern`.
pub fn resolve(concern: Concern, paths: &WardenPaths) -> PathBuf {
    let live = live_target(paths);
    let resolved = match (concern, live) {
        (Concern::Gate, Some(target)) => canonical_gate_path(&target),
        (Concern::Gate, None) => canonical_gate_path(paths),
        (Concern::RecoveryDir, Some(target)) => target.root,
        (Concern::RecoveryDir, None) => paths.root.clone(),
    };
    debug!(concern = ?concern, path = %resolved.display(), "resolved");
    resolved
}

/// Project-hash-scoped gate path, falling back to a legacy unscoped record
/// only when the scoped one does not exist.
pub fn canonical_gate_path(paths: &WardenPaths) -> PathBuf {
    let scoped = paths.gate_path();
    if scoped.exists() {
        return scoped;
    }
    let legacy = paths.legacy_gate_path();
    if legacy.exists() {
        return legacy;
    }
    scoped
}

/// Same lookup order as [`canonical_gate_path`] for the test status record.
pub fn canonical_test_status_path(paths: &WardenPaths) -> PathBuf {
    let scoped = paths.test_status_path();
    if scoped.exists() {
        return scoped;
    }
    let legacy = paths.legacy_test_status_path();
    if legacy.exists() {
        return legacy;
    }
    scoped
}
