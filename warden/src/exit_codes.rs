//! Stable exit codes for warden CLI commands.

/// Event handled; any decision is in the JSON on stdout.
pub const OK: i32 = 0;
/// Invalid input, config, or state on a non-critical path.
pub const INVALID: i32 = 1;
/// The agent stopped without evidence and should try again with the guidance on stderr.
pub const RETRY: i32 = 2;
