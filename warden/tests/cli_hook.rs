//! CLI tests for `warden hook` and friends.
//!
//! Spawns the warden binary and verifies the JSON on stdout and the exit
//! codes the host relies on.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use warden::exit_codes;
use warden::io::paths::HOME_ENV;

fn warden(project: &Path, home: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_warden"))
        .args(args)
        .current_dir(project)
        .env(HOME_ENV, home)
        .env_remove("WARDEN_LOG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn warden");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("warden output")
}

fn hook(project: &Path, home: &Path, event: &str) -> (Value, Option<i32>, String) {
    let out = warden(project, home, &["hook"], event);
    let json = serde_json::from_slice(&out.stdout).expect("stdout is json");
    (
        json,
        out.status.code(),
        String::from_utf8_lossy(&out.stderr).into_owned(),
    )
}

fn layout() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let project = temp.path().join("repo");
    let home = temp.path().join("home");
    fs::create_dir_all(&project).expect("mkdir project");
    (temp, project, home)
}

#[test]
fn destructive_command_is_denied_with_ok_exit() {
    let (_temp, project, home) = layout();
    let (json, code, _) = hook(
        &project,
        &home,
        r#"{"event":"pre_action","action":{"kind":"shell","command":"ls && rm -rf /"}}"#,
    );
    assert_eq!(code, Some(exit_codes::OK));
    assert_eq!(json["decision"], "deny");
    assert!(json["reason"].as_str().is_some_and(|r| r.contains("recursive delete")));
}

#[test]
fn benign_command_is_allowed() {
    let (_temp, project, home) = layout();
    let (json, code, _) = hook(
        &project,
        &home,
        r#"{"event":"pre_action","action":{"kind":"shell","command":"cargo build"}}"#,
    );
    assert_eq!(code, Some(exit_codes::OK));
    assert_eq!(json, serde_json::json!({"decision": "allow"}));
}

#[test]
fn malformed_input_fails_closed() {
    let (_temp, project, home) = layout();
    let (json, code, _) = hook(&project, &home, "{not json");
    assert_eq!(code, Some(exit_codes::OK));
    assert_eq!(json["decision"], "deny");
}

#[test]
fn verifier_without_evidence_exits_with_retry() {
    let (_temp, project, home) = layout();
    let (started, _, _) = hook(
        &project,
        &home,
        r#"{"event":"agent_start","role":"verifier","session_id":"s1"}"#,
    );
    assert_eq!(started["decision"], "allow");
    assert!(started["advisory"].as_str().is_some_and(|a| a.contains("RESULT: PASS")));

    let (json, code, stderr) = hook(
        &project,
        &home,
        r#"{"event":"agent_stop","role":"verifier","session_id":"s1","output":"done"}"#,
    );
    assert_eq!(code, Some(exit_codes::RETRY));
    assert_eq!(json["decision"], "block");
    assert!(stderr.contains("no artifacts"));
    assert!(home.join("traces/index.jsonl").exists());
}

#[test]
fn broken_config_is_invalid_for_passive_events() {
    let (_temp, project, home) = layout();
    fs::create_dir_all(project.join(".warden")).expect("mkdir");
    fs::write(project.join(".warden/config.toml"), "protected_branches = 3\n").expect("config");

    let out = warden(&project, &home, &["hook"], r#"{"event":"session_end"}"#);
    assert_eq!(out.status.code(), Some(exit_codes::INVALID));
    assert!(out.stdout.is_empty());

    let (json, code, _) = hook(
        &project,
        &home,
        r#"{"event":"pre_action","action":{"kind":"shell","command":"ls"}}"#,
    );
    assert_eq!(code, Some(exit_codes::OK));
    assert_eq!(json["decision"], "deny");
}

#[test]
fn gate_command_reports_state() {
    let (_temp, project, home) = layout();
    hook(
        &project,
        &home,
        r#"{"event":"agent_start","role":"implementer","session_id":"s1"}"#,
    );
    let out = warden(&project, &home, &["gate"], "");
    assert_eq!(out.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("needs-verification\t"), "{stdout}");
}
