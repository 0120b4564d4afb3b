//! Governance layer for an AI coding-agent runtime.
//!
//! Every action an agent proposes passes through a fail-closed rule chain;
//! commits are gated on a verification state machine; every agent run leaves
//! a trace that survives crashes. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (rule chain, gate transitions,
//!   rubric, outcome classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (state files, breadcrumb, git,
//!   traces, hook JSON).
//!
//! Orchestration modules ([`evaluate`], [`dispatch`], [`reconcile`],
//! [`failsafe`]) coordinate core logic with I/O to answer host events.

pub mod core;
pub mod dispatch;
pub mod evaluate;
pub mod exit_codes;
pub mod failsafe;
pub mod io;
pub mod logging;
pub mod reconcile;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
