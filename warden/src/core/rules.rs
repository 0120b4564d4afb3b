//! Ordered rule chain over proposed actions.
//!
//! Rules run in strict priority order (tier, then declaration order) and the
//! first non-pass effect is terminal. A composite command is decomposed into
//! segments and every rule is checked against every segment before the next
//! rule runs, so a catastrophic pattern anywhere in the command wins over a
//! softer finding in an earlier segment.
//!
//! Pattern matching uses the quote-stripped view of each segment. Suggested
//! replacements are built from the raw text so the resubmitted command keeps
//! the user's quoting.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::classifier::is_gate_record;
use crate::core::shell::{
    Segment, WriteTarget, expand_segments, join_segments, normalize, replace_word_outside_quotes,
    strip_quoted, write_targets,
};
use crate::core::types::{Action, Decision, GateState, TestStatus};

/// Rule priority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Irreversible destruction. Never overridable.
    Catastrophic,
    /// Context-dependent denials with a small exception list.
    Contextual,
    /// Rules that defer to gate and test-status records.
    Evidence,
}

/// What a rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The whole command line (patterns that span control operators).
    Whole,
    /// Each decomposed segment.
    Segment,
}

/// Result of one rule check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Pass,
    Deny(String),
    /// Replace the checked text with `replacement`.
    Correct { replacement: String, reason: String },
}

/// Ambient facts a rule may consult. Built by the caller; rules never do I/O.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub cwd: PathBuf,
    pub cwd_exists: bool,
    pub project_root: PathBuf,
    /// Where to send the agent when its working directory is going away.
    pub recovery_dir: PathBuf,
    pub gate: GateState,
    /// Fresh test status only; stale records are `None`.
    pub test_status: Option<TestStatus>,
    pub merge_in_progress: bool,
    pub current_branch: Option<String>,
    pub protected_branches: Vec<String>,
}

impl EvalContext {
    /// Context with permissive defaults rooted at `cwd`.
    pub fn for_cwd(cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            cwd_exists: true,
            project_root: cwd.clone(),
            recovery_dir: cwd.clone(),
            cwd,
            gate: GateState::Absent,
            test_status: None,
            merge_in_progress: false,
            current_branch: None,
            protected_branches: vec!["main".to_string(), "master".to_string()],
        }
    }

    fn is_protected(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|b| b == branch)
    }
}

/// Text a rule inspects.
#[derive(Debug)]
pub struct Subject<'a> {
    pub raw: &'a str,
    pub stripped: &'a str,
    pub argv: Vec<String>,
}

impl Subject<'_> {
    fn program(&self) -> Option<&str> {
        self.argv
            .first()
            .map(|word| word.rsplit('/').next().unwrap_or(word))
    }

    /// `(subcommand, args)` for a git invocation, skipping global options.
    fn git(&self) -> Option<(&str, &[String])> {
        if self.program()? != "git" {
            return None;
        }
        let mut idx = 1;
        while idx < self.argv.len() {
            let arg = self.argv[idx].as_str();
            match arg {
                "-C" | "-c" | "--git-dir" | "--work-tree" | "--namespace" => idx += 2,
                _ if arg.starts_with('-') => idx += 1,
                _ => return Some((arg, &self.argv[idx + 1..])),
            }
        }
        None
    }
}

pub type Check = fn(&Subject<'_>, &EvalContext) -> Effect;

pub struct Rule {
    pub name: &'static str,
    pub tier: Tier,
    pub scope: Scope,
    pub check: Check,
}

/// Ordered, short-circuiting predicate/effect pipeline.
pub struct RuleChain {
    rules: Vec<Rule>,
}

impl Default for RuleChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleChain {
    /// Build a chain; rules are stably ordered by tier.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| rule.tier);
        Self { rules }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            rule("fork-bomb", Tier::Catastrophic, Scope::Whole, fork_bomb),
            rule(
                "recursive-delete-root",
                Tier::Catastrophic,
                Scope::Segment,
                recursive_delete_root,
            ),
            rule("raw-disk-write", Tier::Catastrophic, Scope::Segment, raw_disk_write),
            rule(
                "recursive-chmod-root",
                Tier::Catastrophic,
                Scope::Segment,
                recursive_chmod_root,
            ),
            rule(
                "force-push-protected",
                Tier::Catastrophic,
                Scope::Segment,
                force_push_protected,
            ),
            rule("gate-tamper", Tier::Contextual, Scope::Whole, gate_tamper),
            rule("gate-delete", Tier::Contextual, Scope::Segment, gate_delete),
            rule("stale-cwd", Tier::Contextual, Scope::Whole, stale_cwd),
            rule(
                "remove-active-work-area",
                Tier::Contextual,
                Scope::Segment,
                remove_active_work_area,
            ),
            rule("hard-reset", Tier::Contextual, Scope::Segment, hard_reset),
            rule("discard-worktree", Tier::Contextual, Scope::Segment, discard_worktree),
            rule("clean-untracked", Tier::Contextual, Scope::Segment, clean_untracked),
            rule(
                "branch-force-delete",
                Tier::Contextual,
                Scope::Segment,
                branch_force_delete,
            ),
            rule("skip-hooks", Tier::Contextual, Scope::Segment, skip_hooks),
            rule(
                "commit-requires-verification",
                Tier::Evidence,
                Scope::Segment,
                commit_requires_verification,
            ),
            rule(
                "commit-requires-passing-tests",
                Tier::Evidence,
                Scope::Segment,
                commit_requires_passing_tests,
            ),
        ])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a proposed action.
    pub fn evaluate(&self, action: &Action, ctx: &EvalContext) -> Decision {
        match action {
            Action::Shell { command, .. } => self.evaluate_command(command, ctx),
            Action::Write { path, .. } => evaluate_write(Path::new(path), ctx),
            Action::Other { .. } => Decision::Allow,
        }
    }

    fn evaluate_command(&self, command: &str, ctx: &EvalContext) -> Decision {
        let segments = expand_segments(command);
        if segments.is_empty() {
            return Decision::Allow;
        }
        let whole_raw = command.trim();
        let whole_stripped = strip_quoted(whole_raw);
        let argvs: Vec<Vec<String>> = segments.iter().map(Segment::argv).collect();

        for rule in &self.rules {
            match rule.scope {
                Scope::Whole => {
                    let subject = Subject {
                        raw: whole_raw,
                        stripped: &whole_stripped,
                        argv: argvs.first().cloned().unwrap_or_default(),
                    };
                    match (rule.check)(&subject, ctx) {
                        Effect::Pass => {}
                        Effect::Deny(reason) => return deny(rule, reason),
                        Effect::Correct {
                            replacement,
                            reason,
                        } => return Decision::correct(replacement, tagged(rule, &reason)),
                    }
                }
                Scope::Segment => {
                    for (idx, segment) in segments.iter().enumerate() {
                        let subject = Subject {
                            raw: &segment.raw,
                            stripped: &segment.stripped,
                            argv: argvs[idx].clone(),
                        };
                        match (rule.check)(&subject, ctx) {
                            Effect::Pass => {}
                            Effect::Deny(reason) => return deny(rule, reason),
                            Effect::Correct {
                                replacement,
                                reason,
                            } => return correct_segment(rule, &segments, idx, replacement, &reason),
                        }
                    }
                }
            }
        }
        Decision::Allow
    }
}

fn rule(name: &'static str, tier: Tier, scope: Scope, check: Check) -> Rule {
    Rule {
        name,
        tier,
        scope,
        check,
    }
}

fn tagged(rule: &Rule, reason: &str) -> String {
    format!("[{}] {}", rule.name, reason)
}

fn deny(rule: &Rule, reason: String) -> Decision {
    Decision::deny(tagged(rule, &reason))
}

fn correct_segment(
    rule: &Rule,
    segments: &[Segment],
    idx: usize,
    replacement: String,
    reason: &str,
) -> Decision {
    if segments[idx].nested {
        // Inline scripts cannot be rebuilt faithfully; name the fix instead.
        return Decision::deny(format!(
            "{} (inside an inline script; use `{}` instead)",
            tagged(rule, reason),
            replacement
        ));
    }
    let mut rebuilt = segments.to_vec();
    rebuilt[idx].raw = replacement;
    Decision::correct(join_segments(&rebuilt), tagged(rule, reason))
}

fn evaluate_write(path: &Path, _ctx: &EvalContext) -> Decision {
    if is_gate_record(path) {
        return Decision::deny(
            "[gate-tamper] verification gate records are written only by warden \
             (human confirmation or the reviewing role's rubric)",
        );
    }
    Decision::Allow
}

// ---------------------------------------------------------------------------
// Tier 0: catastrophic patterns
// ---------------------------------------------------------------------------

static FORK_BOMB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w:.]+)\(\)\{[\w:.]+\|[\w:.]+&\};[\w:.]+").expect("fork bomb regex")
});

static RAW_DEVICE_REDIRECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r">\s*/dev/(sd[a-z]|hd[a-z]|vd[a-z]|xvd[a-z]|nvme\d|mmcblk\d|disk\d)")
        .expect("raw device regex")
});

const PROTECTED_PATHS: [&str; 20] = [
    "/", "/*", "~", "~/", "~/*", "$HOME", "${HOME}", "$HOME/*", "..", "/bin", "/boot", "/dev",
    "/etc", "/home", "/lib", "/opt", "/root", "/sbin", "/usr", "/var",
];

fn fork_bomb(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let compact: String = subject
        .stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if FORK_BOMB.is_match(&compact) {
        return Effect::Deny("fork bomb".to_string());
    }
    Effect::Pass
}

fn has_short_flag(args: &[String], letters: &[char]) -> bool {
    args.iter().any(|arg| {
        arg.starts_with('-')
            && !arg.starts_with("--")
            && arg.chars().skip(1).any(|c| letters.contains(&c))
    })
}

fn has_long_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

fn is_recursive(args: &[String]) -> bool {
    has_short_flag(args, &['r', 'R']) || has_long_flag(args, "--recursive")
}

fn operands(args: &[String]) -> impl Iterator<Item = &String> {
    args.iter().filter(|arg| !arg.starts_with('-'))
}

fn is_protected_path(target: &str) -> bool {
    let normalized = if target.len() > 1 {
        target.trim_end_matches('/')
    } else {
        target
    };
    let normalized = if normalized.is_empty() { "/" } else { normalized };
    PROTECTED_PATHS.contains(&normalized)
}

fn recursive_delete_root(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    if subject.program() != Some("rm") {
        return Effect::Pass;
    }
    let args = &subject.argv[1..];
    if !is_recursive(args) {
        return Effect::Pass;
    }
    if let Some(target) = operands(args).find(|target| is_protected_path(target)) {
        return Effect::Deny(format!("recursive delete of '{target}' is never allowed"));
    }
    Effect::Pass
}

fn raw_disk_write(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let Some(program) = subject.program() else {
        return Effect::Pass;
    };
    let args = &subject.argv[1..];
    if program.starts_with("mkfs") || program == "wipefs" {
        return Effect::Deny(format!("'{program}' destroys filesystems"));
    }
    let onto_device = args
        .iter()
        .any(|arg| arg.starts_with("of=/dev/") && arg != "of=/dev/null");
    if program == "dd" && onto_device {
        return Effect::Deny("dd onto a device is never allowed".to_string());
    }
    if program == "shred" && args.iter().any(|arg| arg.starts_with("/dev/")) {
        return Effect::Deny("shred of a device is never allowed".to_string());
    }
    if RAW_DEVICE_REDIRECT.is_match(subject.stripped) {
        return Effect::Deny("redirecting output onto a block device".to_string());
    }
    Effect::Pass
}

fn recursive_chmod_root(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let Some(program) = subject.program() else {
        return Effect::Pass;
    };
    if !matches!(program, "chmod" | "chown" | "chgrp") {
        return Effect::Pass;
    }
    let args = &subject.argv[1..];
    if has_short_flag(args, &['R']) || has_long_flag(args, "--recursive") {
        if let Some(target) = operands(args).skip(1).find(|target| is_protected_path(target)) {
            return Effect::Deny(format!("recursive {program} of '{target}'"));
        }
    }
    Effect::Pass
}

fn force_push_protected(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    let Some(("push", args)) = subject.git() else {
        return Effect::Pass;
    };
    let refspecs: Vec<&String> = operands(args).skip(1).collect();
    let forced = has_short_flag(args, &['f'])
        || has_long_flag(args, "--force")
        || has_long_flag(args, "--force-with-lease")
        || refspecs.iter().any(|spec| spec.starts_with('+'));
    if !forced {
        return Effect::Pass;
    }
    let targets_protected = if refspecs.is_empty() {
        ctx.current_branch
            .as_deref()
            .is_some_and(|branch| ctx.is_protected(branch))
    } else {
        refspecs.iter().any(|spec| {
            let dest = spec.trim_start_matches('+');
            let dest = dest.rsplit(':').next().unwrap_or(dest);
            let dest = dest.trim_start_matches("refs/heads/");
            ctx.is_protected(dest)
        })
    };
    if targets_protected {
        return Effect::Deny(
            "force push to a protected branch rewrites shared history".to_string(),
        );
    }
    Effect::Pass
}

// ---------------------------------------------------------------------------
// Tier 1: contextual denials
// ---------------------------------------------------------------------------

const FILE_WRITERS: [&str; 9] =
    ["tee", "cp", "mv", "install", "ln", "truncate", "dd", "rsync", "touch"];
const INTERPRETERS: [&str; 7] = ["python", "python3", "node", "perl", "ruby", "deno", "bun"];

/// Checked over the whole command: a `cd` or a variable set in one segment
/// decides where a later segment writes.
fn gate_tamper(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    let mentions_state = subject.raw.contains(".warden");
    let mentions_verified = subject.raw.to_ascii_lowercase().contains("verified");
    let denial = || {
        Effect::Deny(
            "verification gate records are written only by warden \
             (human confirmation or the reviewing role's rubric)"
                .to_string(),
        )
    };

    let segments = expand_segments(subject.raw);
    for target in write_targets(&segments, &ctx.cwd) {
        let tampers = match &target {
            WriteTarget::Path(path) => {
                is_gate_record(path) || (mentions_verified && in_state_dir(path))
            }
            WriteTarget::Unresolved(text) => {
                mentions_state
                    && (text.contains('$') || looks_like_gate(text) || mentions_verified)
            }
        };
        if tampers {
            return denial();
        }
    }
    if !mentions_state {
        return Effect::Pass;
    }
    for segment in &segments {
        let argv = segment.argv();
        let Some(program) = argv.first().map(|word| word.rsplit('/').next().unwrap_or(word))
        else {
            continue;
        };
        let names_gate = argv[1..].iter().any(|arg| is_gate_record(Path::new(arg)));
        if FILE_WRITERS.contains(&program) && names_gate {
            return denial();
        }
        if INTERPRETERS.contains(&program) && mentions_verified {
            return denial();
        }
    }
    Effect::Pass
}

fn in_state_dir(path: &Path) -> bool {
    path.ends_with(".warden/state")
        || path
            .parent()
            .is_some_and(|dir| dir.ends_with(".warden/state") || dir.ends_with(".warden"))
}

fn looks_like_gate(text: &str) -> bool {
    Path::new(text)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == "gate" || name.starts_with("gate-"))
}

fn gate_delete(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    if !ctx.gate.is_in_flight() {
        return Effect::Pass;
    }
    let Some(program) = subject.program() else {
        return Effect::Pass;
    };
    let args: &[String] = match (program, subject.git()) {
        ("rm" | "unlink" | "shred" | "mv", _) => &subject.argv[1..],
        (_, Some(("rm", args))) => args,
        _ => return Effect::Pass,
    };
    let hits_gate = operands(args).any(|arg| {
        let path = Path::new(arg.trim_end_matches('/'));
        is_gate_record(path)
            || path.ends_with(".warden")
            || path.ends_with(".warden/state")
    });
    if hits_gate {
        return Effect::Deny(format!(
            "cannot remove the verification gate while it is {}",
            ctx.gate
        ));
    }
    Effect::Pass
}

fn stale_cwd(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    if ctx.cwd_exists {
        return Effect::Pass;
    }
    Effect::Correct {
        replacement: format!("cd {} && {}", shell_quote(&ctx.recovery_dir), subject.raw),
        reason: format!(
            "working directory {} no longer exists",
            ctx.cwd.display()
        ),
    }
}

fn remove_active_work_area(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    let target = match (subject.program(), subject.git()) {
        (_, Some(("worktree", args))) if args.first().map(String::as_str) == Some("remove") => {
            operands(&args[1..]).next().cloned()
        }
        (Some("rm"), _) if is_recursive(&subject.argv[1..]) => {
            operands(&subject.argv[1..]).next().cloned()
        }
        _ => None,
    };
    let Some(written) = target else {
        return Effect::Pass;
    };
    let target = normalize(&ctx.cwd, Path::new(&written));
    if !ctx.cwd.starts_with(&target) {
        return Effect::Pass;
    }
    let destination = if ctx.recovery_dir.starts_with(&target) {
        &ctx.project_root
    } else {
        &ctx.recovery_dir
    };
    if destination.starts_with(&target) {
        return Effect::Deny(format!(
            "removing {} would delete the current working directory",
            target.display()
        ));
    }
    // Leaving the directory changes how a relative target resolves, so the
    // replacement names the target absolutely.
    let command = if Path::new(&written).is_absolute() {
        subject.raw.to_string()
    } else {
        let absolute = shell_quote(&target);
        let rewritten = replace_word_outside_quotes(subject.raw, &written, Some(&absolute));
        if rewritten == subject.raw {
            return Effect::Deny(format!(
                "removing {} from inside it strands the shell; cd {} first",
                target.display(),
                shell_quote(destination)
            ));
        }
        rewritten
    };
    Effect::Correct {
        replacement: format!("cd {} && {}", shell_quote(destination), command),
        reason: format!(
            "removing {} from inside it strands the shell; leave it first",
            target.display()
        ),
    }
}

fn hard_reset(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    let Some(("reset", args)) = subject.git() else {
        return Effect::Pass;
    };
    if !has_long_flag(args, "--hard") {
        return Effect::Pass;
    }
    if ctx.merge_in_progress {
        // Abandoning a conflicted merge is the one sanctioned use.
        return Effect::Pass;
    }
    Effect::Correct {
        replacement: "git stash push --include-untracked -m 'warden: saved before reset'"
            .to_string(),
        reason: "git reset --hard discards uncommitted work; stash it instead".to_string(),
    }
}

fn discard_worktree(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    let discards = match subject.git() {
        Some(("checkout", args)) => {
            operands(args).any(|arg| arg == ".")
                && !has_long_flag(args, "--theirs")
                && !has_long_flag(args, "--ours")
        }
        Some(("restore", args)) => {
            operands(args).any(|arg| arg == ".")
                && !has_long_flag(args, "--staged")
                && !has_short_flag(args, &['S'])
        }
        _ => false,
    };
    if !discards || ctx.merge_in_progress {
        return Effect::Pass;
    }
    Effect::Correct {
        replacement: "git stash push --include-untracked -m 'warden: saved before discard'"
            .to_string(),
        reason: "discarding the whole working tree loses uncommitted work; stash it instead"
            .to_string(),
    }
}

fn clean_untracked(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let Some(("clean", args)) = subject.git() else {
        return Effect::Pass;
    };
    let forced = has_short_flag(args, &['f']) || has_long_flag(args, "--force");
    let dry_run = has_short_flag(args, &['n']) || has_long_flag(args, "--dry-run");
    if !forced || dry_run {
        return Effect::Pass;
    }
    let mut letters = String::new();
    for arg in args.iter().filter(|arg| arg.starts_with('-') && !arg.starts_with("--")) {
        for c in arg.chars().skip(1).filter(|c| !matches!(c, 'f' | 'n' | 'i')) {
            if !letters.contains(c) {
                letters.push(c);
            }
        }
    }
    let mut replacement = format!("git clean -n{letters}");
    for arg in args.iter().filter(|arg| !arg.starts_with('-')) {
        replacement.push(' ');
        replacement.push_str(arg);
    }
    Effect::Correct {
        replacement,
        reason: "git clean -f deletes untracked files permanently; review the dry run first"
            .to_string(),
    }
}

fn branch_force_delete(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let Some(("branch", args)) = subject.git() else {
        return Effect::Pass;
    };
    if !args.iter().any(|arg| arg == "-D") {
        return Effect::Pass;
    }
    Effect::Correct {
        replacement: replace_word_outside_quotes(subject.raw, "-D", Some("-d")),
        reason: "-D deletes unmerged branches; -d refuses when work would be lost".to_string(),
    }
}

fn skip_hooks(subject: &Subject<'_>, _ctx: &EvalContext) -> Effect {
    let Some((sub, args)) = subject.git() else {
        return Effect::Pass;
    };
    let skips = args.iter().any(|arg| arg == "--no-verify");
    if !matches!(sub, "commit" | "push" | "merge") || !skips {
        return Effect::Pass;
    }
    Effect::Correct {
        replacement: replace_word_outside_quotes(subject.raw, "--no-verify", None),
        reason: "--no-verify bypasses the repository's quality hooks".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tier 2: evidence-gated rules
// ---------------------------------------------------------------------------

/// True for commit/merge-class actions.
fn is_commit_class(subject: &Subject<'_>) -> bool {
    if let Some((sub, args)) = subject.git() {
        let aborting = has_long_flag(args, "--abort") || has_long_flag(args, "--quit");
        let dry_run = has_long_flag(args, "--dry-run");
        return match sub {
            "commit" | "push" => !dry_run,
            "merge" | "cherry-pick" | "am" | "revert" => !aborting,
            _ => false,
        };
    }
    if subject.program() == Some("gh") {
        let args = &subject.argv[1..];
        return args.len() >= 2 && args[0] == "pr" && args[1] == "merge";
    }
    false
}

fn commit_requires_verification(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    if !is_commit_class(subject) || ctx.gate.permits_commit() {
        return Effect::Pass;
    }
    let next_step = match ctx.gate {
        GateState::NeedsVerification => "run the verifier to collect evidence",
        _ => "confirm the change works (reply 'verified') or let a reviewer confirm it",
    };
    Effect::Deny(format!(
        "commit blocked: verification gate is {}; {next_step}",
        ctx.gate
    ))
}

fn commit_requires_passing_tests(subject: &Subject<'_>, ctx: &EvalContext) -> Effect {
    if is_commit_class(subject) && ctx.test_status == Some(TestStatus::Fail) {
        return Effect::Deny(
            "commit blocked: the most recent test run failed; fix the tests and rerun them"
                .to_string(),
        );
    }
    Effect::Pass
}

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn shell_quote(path: &Path) -> String {
    let text = path.display().to_string();
    if text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c))
    {
        return text;
    }
    format!("'{}'", text.replace('\'', r"'\''"))
}
