//! Process-edge encoding: one JSON event in, one JSON response out.
//!
//! Internally everything is a typed [`Decision`] or [`HookResponse`]; JSON
//! and exit codes exist only here.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{Action, Decision, Role};
use crate::exit_codes;

/// Lifecycle event kinds reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PreAction,
    PostAction,
    AgentStart,
    AgentStop,
    SessionStart,
    SessionEnd,
    UserPrompt,
}

impl EventKind {
    /// Events whose failure must resolve to a deny.
    pub fn is_safety_critical(self) -> bool {
        matches!(self, EventKind::PreAction | EventKind::AgentStart)
    }
}

/// One decoded hook invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HookEvent {
    pub event: EventKind,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub work_area: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

impl HookEvent {
    pub fn new(event: EventKind) -> Self {
        Self {
            event,
            session_id: None,
            cwd: None,
            action: None,
            role: None,
            work_area: None,
            output: None,
            artifacts: Vec::new(),
            prompt: None,
        }
    }

    pub fn session(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("default")
    }
}

pub fn parse_event(raw: &str) -> Result<HookEvent> {
    serde_json::from_str(raw).context("parse hook event json")
}

/// What the process reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResponse {
    /// A gate decision on a proposed action or dispatch.
    Decision {
        decision: Decision,
        advisory: Option<String>,
    },
    /// Informational side message.
    Message(String),
    /// Reject and retry with the attached guidance.
    Retry { reason: String },
    /// Nothing to say.
    Silent,
}

#[derive(Debug, Serialize)]
struct DecisionJson<'a> {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    advisory: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MessageJson<'a> {
    message: &'a str,
}

impl HookResponse {
    pub fn decision(decision: Decision) -> Self {
        HookResponse::Decision {
            decision,
            advisory: None,
        }
    }

    pub fn with_advisory(self, text: impl Into<String>) -> Self {
        match self {
            HookResponse::Decision { decision, .. } => HookResponse::Decision {
                decision,
                advisory: Some(text.into()),
            },
            other => other,
        }
    }

    /// Decision label for logs and the status cache.
    pub fn label(&self) -> &'static str {
        match self {
            HookResponse::Decision { decision, .. } => decision.label(),
            HookResponse::Message(_) => "message",
            HookResponse::Retry { .. } => "retry",
            HookResponse::Silent => "silent",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            HookResponse::Decision { decision, advisory } => {
                let (label, reason, suggestion) = match decision {
                    Decision::Allow => ("allow", None, None),
                    Decision::Deny { reason } => ("deny", Some(reason.as_str()), None),
                    // The host cannot apply silent rewrites, so corrections go out as denies.
                    Decision::Correct { action, reason } => {
                        ("deny", Some(reason.as_str()), Some(action.as_str()))
                    }
                };
                serde_json::to_string(&DecisionJson {
                    decision: label,
                    reason: reason.filter(|r| !r.is_empty()),
                    suggestion,
                    advisory: advisory.as_deref().filter(|a| !a.is_empty()),
                })
            }
            HookResponse::Message(message) => serde_json::to_string(&MessageJson {
                message: message.as_str(),
            }),
            HookResponse::Retry { reason } => serde_json::to_string(&DecisionJson {
                decision: "block",
                reason: Some(reason.as_str()),
                suggestion: None,
                advisory: None,
            }),
            HookResponse::Silent => Ok("{}".to_string()),
        };
        json.context("serialize hook response")
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            HookResponse::Retry { .. } => exit_codes::RETRY,
            _ => exit_codes::OK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_and_full_events() {
        let event = parse_event(r#"{"event":"session_start"}"#).expect("parse");
        assert_eq!(event.event, EventKind::SessionStart);
        assert_eq!(event.session(), "default");

        let event = parse_event(
            r#"{"event":"pre_action","session_id":"s1","cwd":"/repo",
                "action":{"kind":"shell","command":"ls"},"role":"Verifier","extra":1}"#,
        )
        .expect("parse");
        assert_eq!(
            event.action,
            Some(Action::Shell {
                command: "ls".to_string(),
                exit_code: None
            })
        );
        assert_eq!(event.role, Some(Role::Verifier));
    }

    #[test]
    fn unknown_event_kind_is_rejected() {
        assert!(parse_event(r#"{"event":"teleport"}"#).is_err());
        assert!(parse_event("not json").is_err());
    }

    #[test]
    fn correct_is_encoded_as_deny_with_suggestion() {
        let response =
            HookResponse::decision(Decision::correct("git stash", "hard reset discards work"));
        assert_eq!(
            response.to_json().expect("json"),
            r#"{"decision":"deny","reason":"hard reset discards work","suggestion":"git stash"}"#
        );
        assert_eq!(response.exit_code(), exit_codes::OK);
    }

    #[test]
    fn allow_with_advisory() {
        let response = HookResponse::decision(Decision::Allow).with_advisory("evidence dir: /x");
        assert_eq!(
            response.to_json().expect("json"),
            r#"{"decision":"allow","advisory":"evidence dir: /x"}"#
        );
    }

    #[test]
    fn retry_blocks_with_distinct_exit_code() {
        let response = HookResponse::Retry {
            reason: "no artifacts".to_string(),
        };
        assert_eq!(
            response.to_json().expect("json"),
            r#"{"decision":"block","reason":"no artifacts"}"#
        );
        assert_eq!(response.exit_code(), exit_codes::RETRY);
    }

    #[test]
    fn message_and_silent() {
        assert_eq!(
            HookResponse::Message("swept 1".to_string()).to_json().expect("json"),
            r#"{"message":"swept 1"}"#
        );
        assert_eq!(HookResponse::Silent.to_json().expect("json"), "{}");
    }
}
