//! End-to-end governance scenarios driven through the event handler.
//!
//! Each test plays a sequence of host events against a throwaway project and
//! checks the gate, the traces, and the decisions the agent would see.

use std::fs;
use std::path::Path;

use warden::core::types::{Action, Decision, GateState, Outcome, Role, TraceStatus};
use warden::io::hook_io::{EventKind, HookEvent, HookResponse};
use warden::io::trace_store::{self, TRANSCRIPT_FILE, active_markers, load_trace};
use warden::test_support::{TestProject, agent_event, git, shell_event};

const LOW_CONFIDENCE_REPORT: &str =
    "Ran the parser suite; edge cases look fine.\nConfidence: 70%\nRESULT: PASS\n";
const HIGH_CONFIDENCE_REPORT: &str =
    "All 42 tests pass, including the new parser cases.\nConfidence: 97%\nRESULT: PASS\n";

fn feature_branch_project() -> TestProject {
    let project = TestProject::with_git();
    git(project.root(), &["checkout", "-q", "-b", "feature/parser"]);
    project
}

fn decision(response: HookResponse) -> Decision {
    match response {
        HookResponse::Decision { decision, .. } => decision,
        other => panic!("expected a decision, got {other:?}"),
    }
}

fn start(project: &TestProject, role: Role, session: &str, now: u64) -> Decision {
    decision(project.send(&agent_event(EventKind::AgentStart, role, session), now))
}

fn stop(project: &TestProject, role: Role, session: &str, output: &str, now: u64) -> HookResponse {
    let mut event = agent_event(EventKind::AgentStop, role, session);
    event.output = Some(output.to_string());
    project.send(&event, now)
}

fn commit(project: &TestProject, now: u64) -> Decision {
    decision(project.send(&shell_event(project.root(), "git commit -m 'add parser'"), now))
}

fn write_event(root: &Path, path: &str) -> HookEvent {
    let mut event = HookEvent::new(EventKind::PostAction);
    event.cwd = Some(root.to_path_buf());
    event.action = Some(Action::Write {
        path: path.to_string(),
        content: Some("pub fn parse() {}\n".to_string()),
    });
    event
}

/// Implementer, then a verifier whose report goes to human confirmation.
fn run_to_pending(project: &TestProject) {
    assert!(start(project, Role::Implementer, "impl", 100).is_allow());
    assert_eq!(project.gate(), GateState::NeedsVerification);
    stop(project, Role::Implementer, "impl", "implemented the parser", 200);

    assert!(start(project, Role::Verifier, "verify-1", 300).is_allow());
    let response = stop(project, Role::Verifier, "verify-1", LOW_CONFIDENCE_REPORT, 400);
    assert!(
        matches!(&response, HookResponse::Message(m) if m.contains("awaiting human confirmation")),
        "unexpected response: {response:?}"
    );
    assert_eq!(project.gate(), GateState::Pending);
}

#[test]
fn scenario_a_low_confidence_verification_blocks_commit() {
    let project = feature_branch_project();
    assert_eq!(project.gate(), GateState::Absent);

    run_to_pending(&project);

    let denied = commit(&project, 500);
    assert!(!denied.is_allow());
    assert!(denied.reason().is_some_and(|r| r.contains("pending")), "{denied:?}");
}

#[test]
fn scenario_b_confident_reviewer_verifies_automatically() {
    let project = feature_branch_project();
    run_to_pending(&project);

    assert!(start(&project, Role::Verifier, "verify-2", 600).is_allow());
    let response = stop(&project, Role::Verifier, "verify-2", HIGH_CONFIDENCE_REPORT, 700);
    assert!(matches!(&response, HookResponse::Message(m) if m.contains("verified")));
    assert_eq!(project.gate(), GateState::Verified);

    assert_eq!(commit(&project, 800), Decision::Allow);
}

#[test]
fn scenario_c_source_edit_after_verification_reverts_to_pending() {
    let project = feature_branch_project();
    project.set_gate(GateState::Verified, 100);
    assert_eq!(commit(&project, 150), Decision::Allow);

    project.send(&write_event(project.root(), "src/parser.rs"), 200);
    assert_eq!(project.gate(), GateState::Pending);

    let denied = commit(&project, 300);
    assert!(denied.reason().is_some_and(|r| r.contains("pending")), "{denied:?}");
}

#[test]
fn scenario_c_shell_edit_after_verification_reverts_to_pending() {
    let project = feature_branch_project();
    project.set_gate(GateState::Verified, 100);

    let mut edit = HookEvent::new(EventKind::PostAction);
    edit.cwd = Some(project.root().to_path_buf());
    edit.action = Some(Action::Shell {
        command: "sed -i s/a/b/ src/parser.rs".to_string(),
        exit_code: Some(0),
    });
    let response = project.send(&edit, 200);
    assert!(
        matches!(&response, HookResponse::Message(m) if m.contains("src/parser.rs")),
        "{response:?}"
    );
    assert_eq!(project.gate(), GateState::Pending);

    let denied = commit(&project, 300);
    assert!(denied.reason().is_some_and(|r| r.contains("pending")), "{denied:?}");
}

#[test]
fn scenario_d_orphan_sweep_unblocks_dependent_dispatch() {
    let project = TestProject::new();
    assert!(start(&project, Role::Implementer, "impl", 0).is_allow());

    // The implementer's process died without ever reporting a stop.
    let blocked = start(&project, Role::Verifier, "verify", 8_000);
    assert!(
        blocked
            .reason()
            .is_some_and(|r| r.contains("implementer is still active")),
        "{blocked:?}"
    );

    let swept = project.send(&HookEvent::new(EventKind::SessionStart), 8_000);
    assert!(matches!(&swept, HookResponse::Message(m) if m.starts_with("reclassified 1")));
    assert!(active_markers(project.paths()).is_empty());

    assert!(start(&project, Role::Verifier, "verify", 8_001).is_allow());
}

#[test]
fn scenario_e_composite_with_destructive_segment_is_denied() {
    let project = TestProject::new();
    let denied = decision(project.send(
        &shell_event(project.root(), "echo 'cleaning up' && rm -rf / && echo done"),
        1,
    ));
    assert!(!denied.is_allow());
    assert!(denied.reason().is_some_and(|r| r.contains("recursive-delete-root")));

    // Mentioning the pattern inside quotes is harmless.
    let allowed = decision(project.send(
        &shell_event(project.root(), "echo 'never run rm -rf /'"),
        2,
    ));
    assert_eq!(allowed, Decision::Allow);
}

#[test]
fn authoring_role_cannot_approve_its_own_work() {
    let project = TestProject::new();
    project.set_gate(GateState::Pending, 1);

    assert!(start(&project, Role::Implementer, "impl", 10).is_allow());
    stop(&project, Role::Implementer, "impl", HIGH_CONFIDENCE_REPORT, 20);
    assert_eq!(project.gate(), GateState::Pending);

    let tamper = decision(project.send(
        &shell_event(project.root(), "echo 'verified|1' > .warden/state/gate"),
        30,
    ));
    assert!(!tamper.is_allow());

    let mut write = HookEvent::new(EventKind::PreAction);
    write.cwd = Some(project.root().to_path_buf());
    write.action = Some(Action::Write {
        path: ".warden/state/gate".to_string(),
        content: Some("verified|1".to_string()),
    });
    assert!(!decision(project.send(&write, 40)).is_allow());
    assert_eq!(project.gate(), GateState::Pending);
}

#[test]
fn human_confirmation_verifies_pending_gate() {
    let project = TestProject::new();
    project.set_gate(GateState::Pending, 1);

    let mut prompt = HookEvent::new(EventKind::UserPrompt);
    prompt.prompt = Some("LGTM, ship it".to_string());
    project.send(&prompt, 2);
    assert_eq!(project.gate(), GateState::Verified);
}

#[test]
fn verifier_without_evidence_is_sent_back() {
    let project = TestProject::new();
    project.set_gate(GateState::NeedsVerification, 1);
    assert!(start(&project, Role::Verifier, "verify", 10).is_allow());

    let response = stop(&project, Role::Verifier, "verify", "I looked at it, seems fine", 20);
    let HookResponse::Retry { reason } = &response else {
        panic!("expected retry, got {response:?}");
    };
    assert!(reason.contains("no artifacts"));
    assert_eq!(project.gate(), GateState::NeedsVerification);
}

#[test]
fn enrichment_after_finalize_does_not_change_outcome() {
    let project = TestProject::new();
    project.set_gate(GateState::NeedsVerification, 1);
    assert!(start(&project, Role::Verifier, "verify", 10).is_allow());
    let trace_id = trace_store::find_marker(project.paths(), &Role::Verifier, "verify")
        .and_then(|marker| marker.trace_id)
        .expect("trace id");

    stop(&project, Role::Verifier, "verify", "no checks were run", 20);

    let record = load_trace(project.paths(), &trace_id).expect("trace");
    assert_eq!(record.status, TraceStatus::Completed);
    assert_eq!(record.outcome, Outcome::Skipped);
    // The excerpt now sits in the evidence directory, yet the outcome stays put.
    assert!(Path::new(&record.evidence_dir).join(TRANSCRIPT_FILE).exists());

    let again = trace_store::finalize_trace(
        project.paths(),
        &trace_id,
        &trace_store::RunReport::default(),
        1_800,
        30,
    )
    .expect("finalize")
    .expect("record");
    assert_eq!(again.outcome, Outcome::Skipped);

    let index = fs::read_to_string(&project.paths().index_path).expect("index");
    assert_eq!(index.lines().count(), 1);
}

#[test]
fn verifier_with_evidence_file_collects_evidence() {
    let project = TestProject::new();
    project.set_gate(GateState::NeedsVerification, 1);
    assert!(start(&project, Role::Verifier, "verify", 10).is_allow());
    let marker =
        trace_store::find_marker(project.paths(), &Role::Verifier, "verify").expect("marker");
    let trace_id = marker.trace_id.as_deref().expect("id");
    let record = load_trace(project.paths(), trace_id).expect("trace");
    fs::write(Path::new(&record.evidence_dir).join("test-output.log"), "42 passed\n").expect("log");
    fs::write(Path::new(&record.evidence_dir).join("result"), "fail\n").expect("result");

    let response = stop(&project, Role::Verifier, "verify", "see evidence", 20);
    assert!(matches!(
        &response,
        HookResponse::Message(m) if m.contains("verification failed")
    ));
    assert_eq!(project.gate(), GateState::Pending);
}

#[test]
fn work_area_gate_is_followed_through_breadcrumb() {
    let project = TestProject::new();
    let area = project.sibling("repo-wt");
    let mut event = agent_event(EventKind::AgentStart, Role::Implementer, "impl");
    event.work_area = Some(area.clone());
    assert!(decision(project.send(&event, 10)).is_allow());

    assert_eq!(project.gate(), GateState::NeedsVerification);
    let denied = commit(&project, 20);
    assert!(denied.reason().is_some_and(|r| r.contains("needs-verification")), "{denied:?}");

    // Once the work area is gone the project's own record is authoritative again.
    fs::remove_dir_all(&area).expect("remove work area");
    assert_eq!(project.gate(), GateState::Absent);
    assert_eq!(commit(&project, 30), Decision::Allow);
}
