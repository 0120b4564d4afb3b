//! Deterministic, pure logic shared by every warden event handler.
//!
//! Core modules are free of I/O. They take already-loaded state and return
//! decisions, transitions, and classifications suitable for tests.

pub mod classifier;
pub mod dispatch_policy;
pub mod gate;
pub mod outcome;
pub mod record;
pub mod rubric;
pub mod rules;
pub mod shell;
pub mod types;
