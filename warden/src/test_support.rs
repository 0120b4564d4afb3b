//! Test-only helpers for building projects and driving events.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::types::{Action, GateState, Role};
use crate::evaluate::{Project, handle_event};
use crate::io::config::WardenConfig;
use crate::io::gate_store;
use crate::io::hook_io::{EventKind, HookEvent, HookResponse};
use crate::io::paths::WardenPaths;
use crate::io::state_store;

/// Initialize a git repo on branch `main` with one commit containing `README.md`.
pub fn init_git_repo(root: &Path) {
    git(root, &["init"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "user.name", "test"]);
    git(root, &["config", "commit.gpgsign", "false"]);
    fs::write(root.join("README.md"), "hi\n").expect("write README");
    git(root, &["add", "README.md"]);
    git(root, &["commit", "-m", "chore: init"]);
}

/// Run git in `root` and assert it succeeded.
pub fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .unwrap_or_else(|err| panic!("git {args:?}: {err}"));
    assert!(status.success(), "git {args:?} failed");
}

/// A throwaway project root plus a separate warden home.
pub struct TestProject {
    temp: tempfile::TempDir,
    pub project: Project,
}

impl TestProject {
    /// A project directory without git.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).expect("create project root");
        let project = Project {
            paths: WardenPaths::new(root, temp.path().join("home")),
            config: WardenConfig::default(),
        };
        Self {
            temp,
            project,
        }
    }

    /// A project that is a git repository on `main`.
    pub fn with_git() -> Self {
        let this = Self::new();
        init_git_repo(this.root());
        this
    }

    pub fn paths(&self) -> &WardenPaths {
        &self.project.paths
    }

    pub fn root(&self) -> &Path {
        &self.project.paths.root
    }

    /// Scratch directory next to the project, outside its tree.
    pub fn sibling(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join(name);
        fs::create_dir_all(&dir).expect("create sibling");
        dir
    }

    /// Gate state as the evaluator would see it.
    pub fn gate(&self) -> GateState {
        gate_store::read_state(&gate_store::locate(self.paths()))
    }

    pub fn set_gate(&self, state: GateState, now: u64) {
        state_store::write_value(&self.paths().gate_path(), &state, now).expect("write gate");
    }

    /// Evaluate `event`, panicking on error.
    pub fn send(&self, event: &HookEvent, now: u64) -> HookResponse {
        handle_event(&self.project, event, now).expect("handle event")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A pre-action event for a shell command run in `cwd`.
pub fn shell_event(cwd: &Path, command: &str) -> HookEvent {
    let mut event = HookEvent::new(EventKind::PreAction);
    event.cwd = Some(cwd.to_path_buf());
    event.action = Some(Action::Shell {
        command: command.to_string(),
        exit_code: None,
    });
    event
}

/// An agent lifecycle event for `role` in `session`.
pub fn agent_event(kind: EventKind, role: Role, session: &str) -> HookEvent {
    let mut event = HookEvent::new(kind);
    event.role = Some(role);
    event.session_id = Some(session.to_string());
    event
}
