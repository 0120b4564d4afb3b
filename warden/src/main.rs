//! Governance hooks for AI coding agents.
//!
//! The host runtime invokes `warden hook` once per event with a JSON payload
//! on stdin and reads one JSON response from stdout. State lives under the
//! project's `.warden/` directory and traces under `~/.warden`.

use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use warden::core::types::Decision;
use warden::evaluate::{Project, run_hook};
use warden::exit_codes;
use warden::failsafe::{ABNORMAL_EXIT_REASON, CompletionGuard, install_panic_hook};
use warden::io::gate_store;
use warden::io::hook_io::{HookResponse, parse_event};
use warden::io::paths::default_home;
use warden::io::state_store::now_epoch;
use warden::logging;
use warden::reconcile::reconcile;

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Fail-closed governance hooks for AI coding agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read one hook event from stdin and write the response to stdout.
    Hook,
    /// Reclassify orphaned runs as crashed.
    Reconcile {
        /// Project directory (defaults to the current directory).
        #[arg(short = 'C', long)]
        dir: Option<PathBuf>,
    },
    /// Print the resolved verification gate state.
    Gate {
        /// Project directory (defaults to the current directory).
        #[arg(short = 'C', long)]
        dir: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    install_panic_hook();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Hook => Ok(cmd_hook()),
        Command::Reconcile { dir } => cmd_reconcile(dir.as_deref()),
        Command::Gate { dir } => cmd_gate(dir.as_deref()),
    }
}

/// Evaluate one event. Safety-critical events always get a decision on
/// stdout: the guard writes a denial if nothing else does.
fn cmd_hook() -> i32 {
    let stdout = std::io::stdout();
    let mut guard = CompletionGuard::new(stdout.lock());

    let mut raw = String::new();
    if let Err(err) = std::io::stdin().read_to_string(&mut raw) {
        return deny(&mut guard, format!("could not read hook input: {err}"));
    }
    // Unparseable input may have been a safety-critical event.
    let event = match parse_event(&raw) {
        Ok(event) => event,
        Err(err) => return deny(&mut guard, format!("{err:#}")),
    };
    let critical = event.event.is_safety_critical();
    if !critical {
        guard.disarm();
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<HookResponse> {
        let cwd = std::env::current_dir().context("resolve current directory")?;
        let home = default_home()?;
        run_hook(&event, &cwd, &home, now_epoch())
    }));
    match outcome {
        Ok(Ok(response)) => {
            if let HookResponse::Retry { reason } = &response {
                eprintln!("{reason}");
            }
            match guard.complete(&response) {
                Ok(()) => response.exit_code(),
                Err(err) => {
                    eprintln!("{:#}", err);
                    exit_codes::INVALID
                }
            }
        }
        Ok(Err(err)) if critical => deny(&mut guard, format!("{err:#}")),
        Ok(Err(err)) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
        Err(_) if critical => deny(&mut guard, ABNORMAL_EXIT_REASON.to_string()),
        Err(_) => exit_codes::INVALID,
    }
}

fn deny<W: std::io::Write>(guard: &mut CompletionGuard<W>, reason: String) -> i32 {
    warn!(reason = %reason, "denying hook event");
    let response = HookResponse::decision(Decision::deny(format!(
        "warden could not evaluate this event ({reason}); denying"
    )));
    match guard.complete(&response) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn open_project(dir: Option<&Path>) -> Result<Project> {
    let cwd = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    Project::open(&cwd, &default_home()?)
}

fn cmd_reconcile(dir: Option<&Path>) -> Result<i32> {
    let project = open_project(dir)?;
    let report = reconcile(&project.paths, &project.config, now_epoch())?;
    println!(
        "reclassified {} orphaned run(s) as crashed; {} still live",
        report.swept.len(),
        report.live
    );
    for run in &report.swept {
        println!(
            "  {} ({}) trace={} age={}s",
            run.role,
            run.session,
            run.trace_id.as_deref().unwrap_or("-"),
            run.age_secs
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_gate(dir: Option<&Path>) -> Result<i32> {
    let project = open_project(dir)?;
    let path = gate_store::locate(&project.paths);
    let state = gate_store::read_state(&path);
    println!("{state}\t{}", path.display());
    Ok(exit_codes::OK)
}
