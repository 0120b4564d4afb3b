//! Git adapter for warden.
//!
//! Queries are read-only except for checkpoint creation, which writes a stash
//! object and a ref under `refs/warden/checkpoints/` without touching the
//! working tree or index. Every call is bounded by a timeout so a wedged git
//! process cannot eat the evaluator's budget.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKPOINT_REF_PREFIX: &str = "refs/warden/checkpoints";

struct GitOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Current branch name, or `None` on a detached HEAD.
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" || name.is_empty() {
            debug!("detached HEAD");
            return Ok(None);
        }
        debug!(branch = %name, "current branch");
        Ok(Some(name))
    }

    /// Working tree root of the checkout containing `workdir`.
    pub fn toplevel(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Root of the primary checkout, even when `workdir` is a linked worktree.
    #[instrument(skip_all)]
    pub fn common_root(&self) -> Result<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--git-common-dir"])?;
        let common = self.absolute(out.trim());
        if common.file_name().is_some_and(|name| name == ".git") {
            if let Some(parent) = common.parent() {
                return Ok(parent.to_path_buf());
            }
        }
        self.toplevel()
    }

    /// True when tracked or untracked changes exist outside `.warden/`.
    #[instrument(skip_all)]
    pub fn is_dirty(&self) -> Result<bool> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        for line in out.lines().filter(|line| !line.trim().is_empty()) {
            if !status_path(line)?.starts_with(".warden/") {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True while a merge is being resolved (`MERGE_HEAD` exists).
    #[instrument(skip_all)]
    pub fn merge_in_progress(&self) -> Result<bool> {
        let out = self.run_capture(&["rev-parse", "--git-path", "MERGE_HEAD"])?;
        let merging = self.absolute(out.trim()).exists();
        debug!(merging, "merge state");
        Ok(merging)
    }

    /// Record the current working state under `refs/warden/checkpoints/<id>`.
    ///
    /// Uses `git stash create`, which builds a stash commit without modifying
    /// the working tree. A clean tree checkpoints `HEAD`. Returns `None` for a
    /// repository without commits.
    #[instrument(skip_all, fields(id))]
    pub fn create_checkpoint(&self, id: &str) -> Result<Option<String>> {
        let stash = self.run_capture(&["stash", "create", "warden checkpoint"])?;
        let object = match stash.trim() {
            "" => {
                let head = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
                if !head.status.success() {
                    debug!("no commits yet, skipping checkpoint");
                    return Ok(None);
                }
                head.stdout.trim().to_string()
            }
            sha => sha.to_string(),
        };
        let reference = format!("{CHECKPOINT_REF_PREFIX}/{id}");
        self.run_checked(&["update-ref", &reference, &object])?;
        debug!(reference = %reference, object = %object, "checkpoint created");
        Ok(Some(object))
    }

    fn absolute(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.workdir.join(path)
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        Ok(self.run_checked(args)?.stdout)
    }

    fn run_checked(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            ));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not piped"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not piped"))?;
        let stdout_handle = thread::spawn(move || {
            let mut buf = String::new();
            stdout.read_to_string(&mut buf).map(|_| buf)
        });
        let stderr_handle = thread::spawn(move || {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).map(|_| buf)
        });

        let status = match child.wait_timeout(GIT_TIMEOUT).context("wait for git")? {
            Some(status) => status,
            None => {
                warn!(args = %args.join(" "), "git timed out, killing");
                child.kill().context("kill git")?;
                child.wait().context("wait git after kill")?;
                return Err(anyhow!(
                    "git {} timed out after {}s",
                    args.join(" "),
                    GIT_TIMEOUT.as_secs()
                ));
            }
        };

        let stdout = stdout_handle
            .join()
            .map_err(|_| anyhow!("git stdout reader panicked"))?
            .context("read git stdout")?;
        let stderr = stderr_handle
            .join()
            .map_err(|_| anyhow!("git stderr reader panicked"))?
            .context("read git stderr")?;
        Ok(GitOutput {
            status,
            stdout,
            stderr,
        })
    }
}

/// Path of one `git status --porcelain` line; the new path for renames.
fn status_path(line: &str) -> Result<&str> {
    let Some(path) = line.get(3..).filter(|path| !path.is_empty()) else {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    };
    let path = match path.split_once("->") {
        Some((_, new)) => new,
        None => path,
    };
    Ok(path.trim())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::init_git_repo;

    #[test]
    fn status_path_uses_new_path_of_rename() {
        assert_eq!(status_path("R  old.rs -> new.rs").expect("parse"), "new.rs");
        assert_eq!(status_path("?? notes.md").expect("parse"), "notes.md");
        assert!(status_path("M").is_err());
    }

    #[test]
    fn reports_branch_and_dirty_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());

        assert_eq!(git.current_branch().expect("branch"), Some("main".to_string()));
        assert!(!git.is_dirty().expect("dirty"));

        fs::create_dir_all(temp.path().join(".warden/state")).expect("mkdir");
        fs::write(temp.path().join(".warden/state/gate"), "pending|1\n").expect("write");
        assert!(!git.is_dirty().expect("dirty"), "warden state is not a change");

        fs::write(temp.path().join("lib.rs"), "fn main() {}\n").expect("write");
        assert!(git.is_dirty().expect("dirty"));
        assert!(!git.merge_in_progress().expect("merge"));
    }

    #[test]
    fn checkpoint_creates_ref_without_touching_worktree() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        fs::write(temp.path().join("README.md"), "changed\n").expect("write");
        let git = Git::new(temp.path());

        let object = git
            .create_checkpoint("trace-1")
            .expect("checkpoint")
            .expect("object");
        let resolved = git
            .run_capture(&["rev-parse", "refs/warden/checkpoints/trace-1"])
            .expect("rev-parse");
        assert_eq!(resolved.trim(), object);
        assert_eq!(
            fs::read_to_string(temp.path().join("README.md")).expect("read"),
            "changed\n"
        );
    }

    #[test]
    fn common_root_of_primary_checkout_is_toplevel() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());
        let root = git.common_root().expect("root");
        assert_eq!(
            fs::canonicalize(root).expect("canonicalize"),
            fs::canonicalize(temp.path()).expect("canonicalize")
        );
    }
}
