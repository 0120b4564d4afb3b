//! Cached status summary for the status-bar renderer.
//!
//! Written after every evaluation, best-effort. The renderer only reads this
//! file, so its shape is a stable contract.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::GateState;
use crate::io::gate_store;
use crate::io::paths::WardenPaths;
use crate::io::state_store::{ensure_gitignore, write_atomic};
use crate::io::trace_store::{active_markers, rfc3339};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub gate: GateState,
    pub active_roles: Vec<String>,
    pub last_decision: Option<String>,
    pub updated_at: String,
}

/// Recompute and write `.warden/status.json`.
pub fn refresh(
    paths: &WardenPaths,
    last_decision: Option<&str>,
    now: u64,
) -> Result<StatusSnapshot> {
    let gate = gate_store::read_state(&gate_store::locate(paths));
    let active_roles: BTreeSet<String> = active_markers(paths)
        .into_iter()
        .map(|marker| marker.role.as_str().to_string())
        .collect();
    let snapshot = StatusSnapshot {
        gate,
        active_roles: active_roles.into_iter().collect(),
        last_decision: last_decision.map(str::to_string),
        updated_at: rfc3339(now),
    };
    ensure_gitignore(&paths.gitignore_path)?;
    let mut buf = serde_json::to_string_pretty(&snapshot).context("serialize status")?;
    buf.push('\n');
    write_atomic(&paths.status_path, &buf)?;
    debug!(gate = %snapshot.gate, active = snapshot.active_roles.len(), "status cache refreshed");
    Ok(snapshot)
}
