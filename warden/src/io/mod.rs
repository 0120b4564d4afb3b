//! Side-effecting adapters: filesystem state, git, and the hook process edge.

pub mod breadcrumb;
pub mod config;
pub mod gate_store;
pub mod git;
pub mod hook_io;
pub mod paths;
pub mod state_store;
pub mod status_cache;
pub mod trace_store;
