//! Verification gate transitions.
//!
//! ```text
//! absent ──implementer dispatched──▶ needs-verification
//! needs-verification | pending ──evidence collected──▶ pending
//! pending ──human confirmation | reviewer rubric──▶ verified
//! verified ──non-test source change──▶ pending
//! ```
//!
//! Only `Confirmed` and `RubricPassed` can produce `verified`, and the rubric
//! event is refused when it comes from the authoring role.

use crate::core::types::{GateState, Role};

/// Something that may move the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// A code-writing run was dispatched.
    ImplementerDispatched,
    /// A verifying run finished collecting evidence.
    EvidenceCollected,
    /// The confirmation relay saw a human affirmation.
    Confirmed,
    /// The auto-verification rubric passed on `role`'s own output.
    RubricPassed { role: Role },
    /// A non-test source file changed.
    SourceChanged,
}

impl GateEvent {
    /// Stable label recorded next to the state it produced.
    pub fn label(&self) -> &'static str {
        match self {
            GateEvent::ImplementerDispatched => "implementer-dispatched",
            GateEvent::EvidenceCollected => "evidence-collected",
            GateEvent::Confirmed => "confirmed",
            GateEvent::RubricPassed { .. } => "rubric-passed",
            GateEvent::SourceChanged => "source-changed",
        }
    }
}

/// Result of applying a [`GateEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Moved { from: GateState, to: GateState },
    Unchanged(GateState),
    /// The event is not allowed to move the gate from this state.
    Refused { state: GateState, reason: String },
}

impl Transition {
    /// State after the transition.
    pub fn state(&self) -> GateState {
        match self {
            Transition::Moved { to, .. } => *to,
            Transition::Unchanged(state) | Transition::Refused { state, .. } => *state,
        }
    }

    pub fn moved(&self) -> bool {
        matches!(self, Transition::Moved { .. })
    }
}

/// Apply `event` to `state`.
pub fn transition(state: GateState, event: &GateEvent) -> Transition {
    use GateState::{Absent, NeedsVerification, Pending, Verified};

    let moved = |to| Transition::Moved { from: state, to };
    match (state, event) {
        (Absent, GateEvent::ImplementerDispatched) => moved(NeedsVerification),
        (NeedsVerification | Pending, GateEvent::EvidenceCollected) => moved(Pending),
        (Pending, GateEvent::Confirmed) => moved(Verified),
        (NeedsVerification, GateEvent::Confirmed) => Transition::Refused {
            state,
            reason: "no verification evidence has been collected yet".to_string(),
        },
        (_, GateEvent::RubricPassed { role }) if !role.is_reviewing() => Transition::Refused {
            state,
            reason: format!(
                "the {role} role cannot auto-verify; only a reviewing role's own output counts"
            ),
        },
        (Pending, GateEvent::RubricPassed { .. }) => moved(Verified),
        (Verified, GateEvent::SourceChanged) => moved(Pending),
        _ => Transition::Unchanged(state),
    }
}

/// True when `prompt` is a human affirmation from `tokens`.
///
/// The normalized prompt must equal a token or start with one followed by a
/// non-alphanumeric character, so "verified, ship it" counts and
/// "not verified" or "verifiedly" do not.
pub fn is_affirmation(prompt: &str, tokens: &[String]) -> bool {
    let normalized = prompt.trim().to_lowercase();
    let normalized = normalized.trim_end_matches(|c: char| c.is_ascii_punctuation());
    if normalized.is_empty() {
        return false;
    }
    tokens.iter().any(|token| {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return false;
        }
        match normalized.strip_prefix(token.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(|c: char| !c.is_alphanumeric()),
            None => false,
        }
    })
}
