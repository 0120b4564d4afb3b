//! Canonical paths within `.warden/` and the user-scoped trace home.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::types::Role;
use crate::io::git::Git;

/// Environment variable overriding the user-scoped home (`~/.warden`).
pub const HOME_ENV: &str = "WARDEN_HOME";

const PROJECT_HASH_LEN: usize = 12;

/// All paths warden reads or writes for one project root.
#[derive(Debug, Clone)]
pub struct WardenPaths {
    pub root: PathBuf,
    pub warden_dir: PathBuf,
    pub state_dir: PathBuf,
    /// One liveness marker per (role, session).
    pub active_dir: PathBuf,
    pub evidence_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub breadcrumb_path: PathBuf,
    pub status_path: PathBuf,
    /// User-scoped home shared by every project.
    pub home_dir: PathBuf,
    pub traces_dir: PathBuf,
    pub index_path: PathBuf,
    /// Stable short hash of the project root, used to scope state records.
    pub project_hash: String,
}

impl WardenPaths {
    pub fn new(root: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let home_dir = home.into();
        let warden_dir = root.join(".warden");
        let state_dir = warden_dir.join("state");
        let traces_dir = home_dir.join("traces");
        Self {
            project_hash: project_hash(&root),
            root: root.clone(),
            warden_dir: warden_dir.clone(),
            active_dir: warden_dir.join("active"),
            evidence_dir: warden_dir.join("evidence"),
            config_path: warden_dir.join("config.toml"),
            gitignore_path: warden_dir.join(".gitignore"),
            breadcrumb_path: state_dir.join("breadcrumb"),
            status_path: warden_dir.join("status.json"),
            state_dir,
            index_path: traces_dir.join("index.jsonl"),
            traces_dir,
            home_dir,
        }
    }

    /// Locate the project for `cwd`.
    ///
    /// Inside a git checkout the project is the primary checkout, so a linked
    /// worktree resolves to the same `.warden/` as its parent repository.
    /// Outside git, `cwd` itself is the project.
    pub fn discover(cwd: &Path, home: impl Into<PathBuf>) -> Self {
        let root = match Git::new(cwd).common_root() {
            Ok(root) => root,
            Err(err) => {
                debug!(cwd = %cwd.display(), err = %err, "not a git checkout, using cwd");
                cwd.to_path_buf()
            }
        };
        Self::new(root, home)
    }

    /// Project-hash-scoped gate record.
    pub fn gate_path(&self) -> PathBuf {
        self.state_dir.join(format!("gate-{}", self.project_hash))
    }

    /// Unscoped gate record written by older versions.
    pub fn legacy_gate_path(&self) -> PathBuf {
        self.state_dir.join("gate")
    }

    pub fn test_status_path(&self) -> PathBuf {
        self.state_dir.join(format!("test-status-{}", self.project_hash))
    }

    pub fn legacy_test_status_path(&self) -> PathBuf {
        self.state_dir.join("test-status")
    }

    /// Liveness marker for one (role, session) pair.
    pub fn marker_path(&self, role: &Role, session: &str) -> PathBuf {
        self.active_dir.join(format!(
            "{}--{}.json",
            sanitize(role.as_str()),
            sanitize(session)
        ))
    }

    pub fn trace_path(&self, trace_id: &str) -> PathBuf {
        self.traces_dir.join(format!("{}.json", sanitize(trace_id)))
    }

    pub fn evidence_dir_for(&self, trace_id: &str) -> PathBuf {
        self.evidence_dir.join(sanitize(trace_id))
    }
}

/// `$WARDEN_HOME`, else `$HOME/.warden`.
pub fn default_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(|home| PathBuf::from(home).join(".warden"))
        .ok_or_else(|| anyhow!("neither {HOME_ENV} nor HOME is set"))
}

fn project_hash(root: &Path) -> String {
    let canonical = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(PROJECT_HASH_LEN);
    hash
}

/// Make an identifier safe as a single file name component.
pub fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').replace("--", "-_");
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
