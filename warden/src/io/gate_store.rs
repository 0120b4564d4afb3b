//! Reading and moving the verification gate record.
//!
//! [`apply`] is the only writer of gate records, and it only ever writes a
//! state produced by [`transition`], so `verified` can only come from a
//! confirmation or a reviewing role's rubric.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::gate::{GateEvent, Transition, transition};
use crate::core::record::{RecordRead, RecordValue, StateRecord};
use crate::core::types::GateState;
use crate::io::breadcrumb::{self, Concern};
use crate::io::paths::WardenPaths;
use crate::io::state_store;

/// Authoritative gate path for the project (breadcrumb-aware).
pub fn locate(paths: &WardenPaths) -> PathBuf {
    breadcrumb::resolve(Concern::Gate, paths)
}

/// Gate state stored at `path`.
///
/// Missing reads as `absent`. A damaged record reads as
/// `needs-verification`: absent would permit commits, and a damaged gate
/// must never permit anything.
pub fn read_state(path: &Path) -> GateState {
    match state_store::read_classified::<GateState>(path, 0, None) {
        RecordRead::Absent => GateState::Absent,
        RecordRead::Fresh { value, .. } | RecordRead::Stale { value, .. } => value,
        RecordRead::Corrupt => {
            warn!(path = %path.display(), "damaged gate record, holding commits");
            GateState::NeedsVerification
        }
    }
}

/// Apply `event` to the gate at `path`, persisting the result if it moved.
pub fn apply(path: &Path, event: &GateEvent, now: u64) -> Result<Transition> {
    let state = read_state(path);
    let result = transition(state, event);
    match &result {
        Transition::Moved { from, to } => {
            let record = StateRecord::new(to.encode(), now).with_extra(event.label());
            state_store::write(path, &record)?;
            debug!(
                path = %path.display(),
                from = %from,
                to = %to,
                event = event.label(),
                "gate moved"
            );
        }
        Transition::Refused { state, reason } => {
            warn!(
                path = %path.display(),
                state = %state,
                event = event.label(),
                reason = %reason,
                "gate event refused"
            );
        }
        Transition::Unchanged(state) => {
            debug!(path = %path.display(), state = %state, event = event.label(), "gate unchanged");
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::Role;

    #[test]
    fn missing_gate_is_absent_and_damaged_gate_holds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gate");
        assert_eq!(read_state(&path), GateState::Absent);
        fs::write(&path, "verif").expect("write");
        assert_eq!(read_state(&path), GateState::NeedsVerification);
    }

    #[test]
    fn apply_persists_moves_with_event_label() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/gate");
        let t = apply(&path, &GateEvent::ImplementerDispatched, 50).expect("apply");
        assert!(t.moved());
        let record = state_store::read(&path).expect("record");
        assert_eq!(record.value, "needs-verification");
        assert_eq!(record.epoch, 50);
        assert_eq!(record.extra.as_deref(), Some("implementer-dispatched"));
    }

    #[test]
    fn refused_events_write_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("gate");
        state_store::write_value(&path, &GateState::Pending, 1).expect("write");
        let t = apply(
            &path,
            &GateEvent::RubricPassed {
                role: Role::Implementer,
            },
            99,
        )
        .expect("apply");
        assert!(matches!(t, Transition::Refused { .. }));
        assert_eq!(state_store::read(&path).expect("record").epoch, 1);
    }
}
