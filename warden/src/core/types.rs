//! Shared deterministic types for warden core logic.
//!
//! These types define the contracts between the rule chain, the verification
//! gate, and the trace protocol. They never touch the filesystem; encoding to
//! JSON or exit codes happens only at the process edge.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Verdict for a proposed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is rejected.
    Deny { reason: String },
    /// The action is rejected, but `action` is a safe replacement to resubmit.
    Correct { action: String, reason: String },
}

impl Decision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Decision::Deny {
            reason: reason.into(),
        }
    }

    pub fn correct(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Decision::Correct {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Deny { reason } | Decision::Correct { reason, .. } => Some(reason),
        }
    }

    /// Short label for logs and the status cache.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny { .. } => "deny",
            Decision::Correct { .. } => "correct",
        }
    }
}

/// A proposed action reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// A shell command line. `exit_code` is only known after the fact.
    Shell {
        command: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// A direct file write by the agent's editing tools.
    Write {
        path: String,
        #[serde(default)]
        content: Option<String>,
    },
    /// Anything else (reads, searches, web access).
    Other {
        #[serde(default)]
        name: String,
    },
}

/// Role of an agent run.
///
/// The implementer authors code; verifier and reviewer are reviewing roles whose
/// output may drive auto-verification; the shipper issues commits and merges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Implementer,
    Verifier,
    Reviewer,
    Shipper,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Implementer => "implementer",
            Role::Verifier => "verifier",
            Role::Reviewer => "reviewer",
            Role::Shipper => "shipper",
            Role::Other(name) => name,
        }
    }

    /// True for the role that writes the code under verification.
    pub fn is_authoring(&self) -> bool {
        matches!(self, Role::Implementer)
    }

    /// True for roles whose own output may be scored by the auto-verification rubric.
    pub fn is_reviewing(&self) -> bool {
        matches!(self, Role::Verifier | Role::Reviewer)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "implementer" => Role::Implementer,
            "verifier" => Role::Verifier,
            "reviewer" => Role::Reviewer,
            "shipper" => Role::Shipper,
            _ => Role::Other(value.trim().to_string()),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_string())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification gate state for one project + work area.
///
/// `Absent` is never stored; it is what a missing or unreadable record means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateState {
    Absent,
    NeedsVerification,
    Pending,
    Verified,
}

impl GateState {
    pub fn as_str(self) -> &'static str {
        match self {
            GateState::Absent => "absent",
            GateState::NeedsVerification => "needs-verification",
            GateState::Pending => "pending",
            GateState::Verified => "verified",
        }
    }

    /// Implementation work is in flight and awaiting verification.
    pub fn is_in_flight(self) -> bool {
        matches!(self, GateState::NeedsVerification | GateState::Pending)
    }

    /// Commit/merge-class actions are permitted only in these states.
    pub fn permits_commit(self) -> bool {
        matches!(self, GateState::Absent | GateState::Verified)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last recorded test-suite result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
        }
    }
}

/// Lifecycle status of a trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Active,
    Completed,
    Crashed,
}

/// Evidence-derived outcome of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Timeout,
    Skipped,
    Crashed,
    Unknown,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Partial => "partial",
            Outcome::Timeout => "timeout",
            Outcome::Skipped => "skipped",
            Outcome::Crashed => "crashed",
            Outcome::Unknown => "unknown",
        }
    }

    /// True when the run produced a conclusive pass/fail signal.
    pub fn is_conclusive(self) -> bool {
        matches!(self, Outcome::Success | Outcome::Failure)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_names_case_insensitively() {
        assert_eq!(Role::from("Verifier"), Role::Verifier);
        assert_eq!(Role::from(" implementer "), Role::Implementer);
        assert_eq!(Role::from("docs-writer"), Role::Other("docs-writer".to_string()));
    }

    #[test]
    fn only_reviewing_roles_are_reviewing() {
        assert!(Role::Verifier.is_reviewing());
        assert!(Role::Reviewer.is_reviewing());
        assert!(!Role::Implementer.is_reviewing());
        assert!(!Role::Shipper.is_reviewing());
    }

    #[test]
    fn commit_permitted_only_when_absent_or_verified() {
        assert!(GateState::Absent.permits_commit());
        assert!(GateState::Verified.permits_commit());
        assert!(!GateState::Pending.permits_commit());
        assert!(!GateState::NeedsVerification.permits_commit());
    }

    #[test]
    fn action_decodes_tagged_json() {
        let action: Action =
            serde_json::from_str(r#"{"kind":"shell","command":"ls"}"#).expect("decode");
        assert_eq!(
            action,
            Action::Shell {
                command: "ls".to_string(),
                exit_code: None
            }
        );
    }
}
