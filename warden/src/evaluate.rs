//! Orchestration for one hook invocation.
//!
//! Loads state for the event's project, runs the matching handler, and
//! refreshes the status cache last. Cheap critical work (the decision) always
//! runs before advisory work (enrichment, index, status cache), and advisory
//! failures are logged and swallowed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::classifier::{PathClass, classify_path};
use crate::core::gate::{GateEvent, Transition, is_affirmation};
use crate::core::outcome::missing_evidence;
use crate::core::rubric;
use crate::core::rules::{EvalContext, RuleChain};
use crate::core::shell::{Segment, WriteTarget, expand_segments, write_targets};
use crate::core::types::{Action, Decision, Outcome, Role, TestStatus};
use crate::dispatch::{DispatchInput, DispatchOutcome, dispatch_agent};
use crate::io::breadcrumb::{self, Concern};
use crate::io::config::{WardenConfig, load_config};
use crate::io::gate_store;
use crate::io::git::Git;
use crate::io::hook_io::{EventKind, HookEvent, HookResponse};
use crate::io::paths::WardenPaths;
use crate::io::state_store;
use crate::io::status_cache;
use crate::io::trace_store::{self, RunReport, TraceRecord, find_marker, finalize_trace};
use crate::reconcile::reconcile;

/// A loaded project: where its state lives and how it is configured.
#[derive(Debug, Clone)]
pub struct Project {
    pub paths: WardenPaths,
    pub config: WardenConfig,
}

impl Project {
    pub fn open(cwd: &Path, home: &Path) -> Result<Self> {
        let paths = WardenPaths::discover(cwd, home);
        let config = load_config(&paths.config_path)
            .with_context(|| format!("load config for {}", paths.root.display()))?;
        Ok(Self { paths, config })
    }
}

/// Evaluate one event from the host.
///
/// Errors on safety-critical events become denials here; errors on other
/// events are returned for the caller to report.
#[instrument(skip_all, fields(event = ?event.event))]
pub fn run_hook(event: &HookEvent, cwd: &Path, home: &Path, now: u64) -> Result<HookResponse> {
    let cwd = event.cwd.clone().unwrap_or_else(|| cwd.to_path_buf());
    let result = Project::open(&existing_ancestor(&cwd), home)
        .and_then(|project| handle_event(&project, event, now));
    match result {
        Ok(response) => Ok(response),
        Err(err) if event.event.is_safety_critical() => {
            warn!(err = %format!("{err:#}"), "evaluation failed, denying");
            Ok(HookResponse::decision(Decision::deny(format!(
                "warden could not evaluate this action safely ({err:#}); denying"
            ))))
        }
        Err(err) => Err(err),
    }
}

/// Dispatch `event` to its handler, then refresh the status cache.
pub fn handle_event(project: &Project, event: &HookEvent, now: u64) -> Result<HookResponse> {
    let response = match event.event {
        EventKind::SessionStart => on_session_start(project, now)?,
        EventKind::PreAction => on_pre_action(project, event, now),
        EventKind::PostAction => on_post_action(project, event, now)?,
        EventKind::AgentStart => on_agent_start(project, event, now)?,
        EventKind::AgentStop => on_agent_stop(project, event, now)?,
        EventKind::UserPrompt => on_user_prompt(project, event, now)?,
        EventKind::SessionEnd => HookResponse::Silent,
    };
    debug!(response = response.label(), "event handled");
    if let Err(err) = status_cache::refresh(&project.paths, Some(response.label()), now) {
        warn!(err = %err, "status cache refresh failed");
    }
    Ok(response)
}

fn on_session_start(project: &Project, now: u64) -> Result<HookResponse> {
    let report = reconcile(&project.paths, &project.config, now)?;
    if report.swept.is_empty() {
        return Ok(HookResponse::Silent);
    }
    let runs: Vec<String> = report
        .swept
        .iter()
        .map(|run| format!("{} ({})", run.role, run.session))
        .collect();
    Ok(HookResponse::Message(format!(
        "reclassified {} orphaned run(s) as crashed: {}",
        report.swept.len(),
        runs.join(", ")
    )))
}

/// Ambient facts for the rule chain. Every lookup degrades to the
/// restrictive reading when it fails.
pub fn build_context(project: &Project, cwd: &Path, now: u64) -> EvalContext {
    let paths = &project.paths;
    let cwd_exists = cwd.is_dir();
    let git = Git::new(if cwd_exists { cwd } else { paths.root.as_path() });
    let merge_in_progress = git.merge_in_progress().unwrap_or_else(|err| {
        debug!(err = %err, "merge state unknown");
        false
    });
    let current_branch = git.current_branch().unwrap_or_else(|err| {
        debug!(err = %err, "branch unknown");
        None
    });
    let test_status = state_store::read_value::<TestStatus>(
        &breadcrumb::canonical_test_status_path(paths),
        now,
        Some(project.config.test_status_max_age_secs),
    );
    EvalContext {
        cwd: cwd.to_path_buf(),
        cwd_exists,
        project_root: paths.root.clone(),
        recovery_dir: breadcrumb::resolve(Concern::RecoveryDir, paths),
        gate: gate_store::read_state(&gate_store::locate(paths)),
        test_status,
        merge_in_progress,
        current_branch,
        protected_branches: project.config.protected_branches.clone(),
    }
}

fn on_pre_action(project: &Project, event: &HookEvent, now: u64) -> HookResponse {
    let Some(action) = &event.action else {
        return HookResponse::decision(Decision::Allow);
    };
    let cwd = event_cwd(project, event);
    let ctx = build_context(project, &cwd, now);
    let decision = RuleChain::standard().evaluate(action, &ctx);
    debug!(decision = decision.label(), reason = ?decision.reason(), "pre-action evaluated");
    HookResponse::decision(decision)
}

fn on_post_action(project: &Project, event: &HookEvent, now: u64) -> Result<HookResponse> {
    let Some(action) = &event.action else {
        return Ok(HookResponse::Silent);
    };
    let cwd = event_cwd(project, event);
    match action {
        Action::Write { path, .. } => {
            let path = cwd.join(path);
            if classify_path(&relative_to_work(project, &path)) != PathClass::Source {
                return Ok(HookResponse::Silent);
            }
            source_changed(project, &path, now)
        }
        Action::Shell { command, exit_code } => {
            let segments = expand_segments(command);
            if let Some(code) = exit_code {
                record_test_status(project, &segments, *code, now)?;
            }
            match first_source_write(project, &segments, &cwd) {
                Some(path) => source_changed(project, &path, now),
                None => Ok(HookResponse::Silent),
            }
        }
        Action::Other { .. } => Ok(HookResponse::Silent),
    }
}

fn source_changed(project: &Project, path: &Path, now: u64) -> Result<HookResponse> {
    let gate_path = gate_store::locate(&project.paths);
    let transition = gate_store::apply(&gate_path, &GateEvent::SourceChanged, now)?;
    if transition.moved() {
        return Ok(HookResponse::Message(format!(
            "verification gate reverted to pending: {} changed after verification",
            path.display()
        )));
    }
    Ok(HookResponse::Silent)
}

/// First non-test source file a shell command wrote.
fn first_source_write(project: &Project, segments: &[Segment], cwd: &Path) -> Option<PathBuf> {
    write_targets(segments, cwd)
        .into_iter()
        .find_map(|target| match target {
            WriteTarget::Path(path) => {
                let class = classify_path(&relative_to_work(project, &path));
                (class == PathClass::Source).then_some(path)
            }
            WriteTarget::Unresolved(text) => {
                debug!(target = %text, "shell write target not resolvable");
                None
            }
        })
}

fn record_test_status(project: &Project, segments: &[Segment], code: i32, now: u64) -> Result<()> {
    let ran_tests = segments
        .iter()
        .any(|segment| project.config.is_test_command(&segment.argv().join(" ")));
    if !ran_tests {
        return Ok(());
    }
    let status = if code == 0 {
        TestStatus::Pass
    } else {
        TestStatus::Fail
    };
    state_store::write_value(&project.paths.test_status_path(), &status, now)?;
    debug!(status = status.as_str(), "test status recorded");
    Ok(())
}

fn on_agent_start(project: &Project, event: &HookEvent, now: u64) -> Result<HookResponse> {
    let role = event_role(event);
    let work_area = event.work_area.as_deref();
    let outcome = dispatch_agent(
        &project.paths,
        &project.config,
        &DispatchInput {
            role: &role,
            session: event.session(),
            work_area,
        },
        now,
    )?;
    match outcome {
        DispatchOutcome::Denied { reasons } => {
            Ok(HookResponse::decision(Decision::deny(reasons.join("; "))))
        }
        DispatchOutcome::Admitted { trace, .. } => Ok(HookResponse::decision(Decision::Allow)
            .with_advisory(format!(
                "trace {}: save verification evidence under {} and end with \
                 `RESULT: PASS` or `RESULT: FAIL`",
                trace.id, trace.evidence_dir
            ))),
    }
}

fn on_agent_stop(project: &Project, event: &HookEvent, now: u64) -> Result<HookResponse> {
    let role = event_role(event);
    let Some(marker) = find_marker(&project.paths, &role, event.session()) else {
        debug!(role = %role, "no active run to finalize");
        return Ok(HookResponse::Silent);
    };
    let Some(trace_id) = marker.trace_id.clone() else {
        warn!(marker = %marker.path.display(), "damaged marker, closing as crashed");
        trace_store::crash_marker(&project.paths, &marker, now)?;
        return Ok(HookResponse::Silent);
    };

    // Finalize before anything can add evidence to the run's directory.
    let report = RunReport {
        output: event.output.as_deref(),
        artifacts: &event.artifacts,
    };
    let Some(record) = finalize_trace(
        &project.paths,
        &trace_id,
        &report,
        project.config.trace_timeout_secs,
        now,
    )?
    else {
        return Ok(HookResponse::Silent);
    };

    let response = apply_stop_to_gate(project, &record, event.output.as_deref(), now)?;
    enrich(project, &record, event.output.as_deref());
    Ok(response)
}

fn apply_stop_to_gate(
    project: &Project,
    record: &TraceRecord,
    output: Option<&str>,
    now: u64,
) -> Result<HookResponse> {
    if !record.role.is_reviewing() {
        return Ok(HookResponse::Message(format!(
            "{} run finished: {}",
            record.role, record.outcome
        )));
    }
    if let Some(guidance) = missing_evidence(record.outcome, &record.evidence_dir) {
        return Ok(HookResponse::Retry { reason: guidance });
    }

    let gate_path = gate_store::locate(&project.paths);
    let collected = gate_store::apply(&gate_path, &GateEvent::EvidenceCollected, now)?;
    if record.outcome != Outcome::Success {
        return Ok(HookResponse::Message(format!(
            "verification failed ({}); gate is {}",
            record.outcome,
            collected.state()
        )));
    }

    let verdict = rubric::score(output.unwrap_or_default(), &project.config.rubric_policy());
    if !verdict.passed() {
        return Ok(HookResponse::Message(format!(
            "verification evidence collected; gate is {}; awaiting human confirmation ({})",
            collected.state(),
            verdict.failures.join("; ")
        )));
    }
    let rubric_event = GateEvent::RubricPassed {
        role: record.role.clone(),
    };
    match gate_store::apply(&gate_path, &rubric_event, now)? {
        Transition::Moved { to, .. } => Ok(HookResponse::Message(format!(
            "auto-verification rubric passed; gate is {to}"
        ))),
        other => Ok(HookResponse::Message(format!(
            "verification evidence collected; gate is {}",
            other.state()
        ))),
    }
}

/// Best-effort work after the outcome is fixed.
fn enrich(project: &Project, record: &TraceRecord, output: Option<&str>) {
    if let Some(output) = output {
        if let Err(err) = trace_store::write_transcript_excerpt(record, output) {
            warn!(trace_id = %record.id, err = %err, "transcript excerpt failed");
        }
    }
    if let Err(err) = trace_store::append_index(&project.paths, record) {
        warn!(trace_id = %record.id, err = %err, "index append failed");
    }
}

fn on_user_prompt(project: &Project, event: &HookEvent, now: u64) -> Result<HookResponse> {
    let Some(prompt) = event.prompt.as_deref() else {
        return Ok(HookResponse::Silent);
    };
    if !is_affirmation(prompt, &project.config.affirmations) {
        return Ok(HookResponse::Silent);
    }
    let gate_path = gate_store::locate(&project.paths);
    match gate_store::apply(&gate_path, &GateEvent::Confirmed, now)? {
        Transition::Moved { to, .. } => Ok(HookResponse::Message(format!(
            "confirmation recorded; verification gate is {to}"
        ))),
        Transition::Refused { reason, .. } => Ok(HookResponse::Message(format!(
            "confirmation not recorded: {reason}"
        ))),
        Transition::Unchanged(_) => Ok(HookResponse::Silent),
    }
}

fn event_role(event: &HookEvent) -> Role {
    event
        .role
        .clone()
        .unwrap_or_else(|| Role::Other("agent".to_string()))
}

fn event_cwd(project: &Project, event: &HookEvent) -> PathBuf {
    event
        .cwd
        .clone()
        .unwrap_or_else(|| project.paths.root.clone())
}

/// `path` relative to the work area it lives in, for classification.
fn relative_to_work(project: &Project, path: &Path) -> PathBuf {
    let live = breadcrumb::live_target(&project.paths).map(|target| target.root);
    for base in live.iter().chain(std::iter::once(&project.paths.root)) {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.to_path_buf();
        }
    }
    path.to_path_buf()
}

/// Nearest existing directory at or above `path`, so a deleted working
/// directory still finds its project.
fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|candidate| candidate.is_dir())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}
