//! Orchestration for starting an agent run.
//!
//! Composes the dispatch predicates with gate and trace liveness state, then
//! on admission starts the trace and, for the implementing role, opens the
//! verification gate.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::dispatch_policy::{DispatchRequest, check_dispatch};
use crate::core::gate::{GateEvent, Transition};
use crate::core::types::Role;
use crate::io::breadcrumb;
use crate::io::config::WardenConfig;
use crate::io::gate_store;
use crate::io::git::Git;
use crate::io::paths::{WardenPaths, sanitize};
use crate::io::trace_store::{StartTrace, TraceRecord, active_markers, start_trace};

/// A request to start a run.
#[derive(Debug, Clone)]
pub struct DispatchInput<'a> {
    pub role: &'a Role,
    pub session: &'a str,
    /// Secondary work area the run is routed into, if any.
    pub work_area: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Admitted {
        trace: TraceRecord,
        /// Gate movement caused by the dispatch (implementing role only).
        gate: Option<Transition>,
    },
    Denied {
        reasons: Vec<String>,
    },
}

/// Decide whether the run may start; on admission, record it.
#[instrument(skip_all, fields(role = %input.role, session = input.session))]
pub fn dispatch_agent(
    paths: &WardenPaths,
    cfg: &WardenConfig,
    input: &DispatchInput<'_>,
    now: u64,
) -> Result<DispatchOutcome> {
    let gate = gate_store::read_state(&gate_store::locate(paths));
    // This run's own slot is replaced on start, so it never blocks itself.
    let own_slot = paths.marker_path(input.role, input.session);
    let active_roles: Vec<Role> = active_markers(paths)
        .into_iter()
        .filter(|marker| marker.path != own_slot)
        .map(|marker| marker.role)
        .collect();

    let workdir = input.work_area.unwrap_or(paths.root.as_path());
    let git = Git::new(workdir);
    let branch = match git.current_branch() {
        Ok(branch) => branch,
        Err(err) => {
            debug!(err = %err, "branch unknown");
            None
        }
    };

    let policy = cfg.dispatch_policy();
    let reasons = check_dispatch(
        &DispatchRequest {
            role: input.role,
            gate,
            active_roles: &active_roles,
            current_branch: branch.as_deref(),
            target_branch: None,
        },
        &policy,
    );
    if !reasons.is_empty() {
        debug!(?reasons, "dispatch denied");
        return Ok(DispatchOutcome::Denied { reasons });
    }

    let dirty = match git.is_dirty() {
        Ok(dirty) => Some(dirty),
        Err(err) => {
            debug!(err = %err, "work tree state unknown");
            None
        }
    };
    if dirty == Some(true) {
        debug!("run starts on a work tree with uncommitted changes");
    }

    let checkpoint = if input.role.is_authoring() {
        let name = format!("{}-{}", sanitize(input.session), now);
        match git.create_checkpoint(&name) {
            Ok(object) => object,
            Err(err) => {
                warn!(err = %err, "checkpoint failed, continuing without one");
                None
            }
        }
    } else {
        None
    };

    let trace = start_trace(
        paths,
        &StartTrace {
            role: input.role,
            session: input.session,
            branch: branch.as_deref(),
            work_area: input.work_area,
            checkpoint: checkpoint.as_deref(),
            dirty,
        },
        now,
    )?;

    let gate = if input.role.is_authoring() {
        Some(open_gate(paths, input.work_area, now)?)
    } else {
        None
    };
    debug!(trace_id = %trace.id, "dispatch admitted");
    Ok(DispatchOutcome::Admitted { trace, gate })
}

/// absent -> needs-verification at the location the work happens in.
///
/// Work routed into a secondary area gets its own gate copy plus a breadcrumb
/// from the project, written after the gate so the breadcrumb never points at
/// a target that is not yet in flight.
fn open_gate(paths: &WardenPaths, work_area: Option<&Path>, now: u64) -> Result<Transition> {
    match work_area.filter(|area| *area != paths.root.as_path()) {
        Some(area) => {
            let target = WardenPaths::new(area, &paths.home_dir);
            let gate_path = breadcrumb::canonical_gate_path(&target);
            let transition = gate_store::apply(&gate_path, &GateEvent::ImplementerDispatched, now)?;
            if transition.state().is_in_flight() {
                breadcrumb::write(paths, area, now)?;
            }
            Ok(transition)
        }
        None => {
            let gate_path = gate_store::locate(paths);
            gate_store::apply(&gate_path, &GateEvent::ImplementerDispatched, now)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::GateState;
    use crate::io::state_store;
    use crate::io::trace_store::find_marker;
    use crate::test_support::{git, init_git_repo};

    fn paths() -> (tempfile::TempDir, WardenPaths) {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).expect("mkdir");
        let paths = WardenPaths::new(root, temp.path().join("home"));
        (temp, paths)
    }

    fn input<'a>(role: &'a Role, work_area: Option<&'a Path>) -> DispatchInput<'a> {
        DispatchInput {
            role,
            session: "s1",
            work_area,
        }
    }

    #[test]
    fn implementer_opens_gate_and_starts_trace() {
        let (_temp, paths) = paths();
        let outcome = dispatch_agent(
            &paths,
            &WardenConfig::default(),
            &input(&Role::Implementer, None),
            10,
        )
        .expect("dispatch");
        let DispatchOutcome::Admitted { trace, gate } = outcome else {
            panic!("expected admission");
        };
        assert_eq!(gate.map(|t| t.state()), Some(GateState::NeedsVerification));
        assert!(find_marker(&paths, &Role::Implementer, "s1").is_some());
        assert_eq!(trace.role, Role::Implementer);
    }

    #[test]
    fn work_area_gets_gate_copy_and_breadcrumb() {
        let (temp, paths) = paths();
        let area = temp.path().join("repo-wt");
        fs::create_dir_all(&area).expect("mkdir");
        dispatch_agent(
            &paths,
            &WardenConfig::default(),
            &input(&Role::Implementer, Some(&area)),
            10,
        )
        .expect("dispatch");

        assert_eq!(breadcrumb::read(&paths), Some(area.clone()));
        let target = WardenPaths::new(&area, &paths.home_dir);
        assert_eq!(gate_store::locate(&paths), target.gate_path());
        assert_eq!(
            gate_store::read_state(&gate_store::locate(&paths)),
            GateState::NeedsVerification
        );
    }

    #[test]
    fn authoring_run_records_checkpoint_and_dirty_tree() {
        let (_temp, paths) = paths();
        init_git_repo(&paths.root);
        git(&paths.root, &["checkout", "-q", "-b", "feature/x"]);
        fs::write(paths.root.join("README.md"), "edited\n").expect("edit");

        let outcome = dispatch_agent(
            &paths,
            &WardenConfig::default(),
            &input(&Role::Implementer, None),
            10,
        )
        .expect("dispatch");
        let DispatchOutcome::Admitted { trace, .. } = outcome else {
            panic!("expected admission");
        };
        assert_eq!(trace.dirty_at_start, Some(true));
        assert!(trace.checkpoint.is_some());
        assert_eq!(trace.branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn run_outside_a_repository_leaves_tree_state_unknown() {
        let (_temp, paths) = paths();
        let outcome = dispatch_agent(
            &paths,
            &WardenConfig::default(),
            &input(&Role::Verifier, None),
            10,
        )
        .expect("dispatch");
        let DispatchOutcome::Admitted { trace, .. } = outcome else {
            panic!("expected admission");
        };
        assert_eq!(trace.dirty_at_start, None);
        assert_eq!(trace.checkpoint, None);
    }

    #[test]
    fn shipper_is_denied_until_verified() {
        let (_temp, paths) = paths();
        state_store::write_value(&paths.gate_path(), &GateState::Pending, 1).expect("gate");
        let outcome = dispatch_agent(
            &paths,
            &WardenConfig::default(),
            &input(&Role::Shipper, None),
            10,
        )
        .expect("dispatch");
        let DispatchOutcome::Denied { reasons } = outcome else {
            panic!("expected denial");
        };
        assert!(reasons[0].contains("pending"));
        assert!(find_marker(&paths, &Role::Shipper, "s1").is_none());
    }

    #[test]
    fn verifier_waits_for_active_implementer() {
        let (_temp, paths) = paths();
        let cfg = WardenConfig::default();
        dispatch_agent(&paths, &cfg, &input(&Role::Implementer, None), 10).expect("implementer");
        let outcome = dispatch_agent(
            &paths,
            &cfg,
            &DispatchInput {
                role: &Role::Verifier,
                session: "s2",
                work_area: None,
            },
            20,
        )
        .expect("verifier");
        assert!(matches!(outcome, DispatchOutcome::Denied { .. }));
    }
}
