//! Fail-closed completion for hook invocations.
//!
//! A safety-critical invocation must always leave a decision on stdout. The
//! [`CompletionGuard`] writes a denial when it is dropped without having been
//! completed, which covers early returns and unwinding panics alike.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::error;

use crate::core::types::Decision;
use crate::io::hook_io::HookResponse;

/// Reason attached to the denial written by an uncompleted guard.
pub const ABNORMAL_EXIT_REASON: &str =
    "warden stopped before reaching a decision; denying to stay safe";

/// Writes a denial on drop unless [`CompletionGuard::complete`] ran first.
#[derive(Debug)]
pub struct CompletionGuard<W: Write> {
    out: W,
    armed: bool,
}

impl<W: Write> CompletionGuard<W> {
    /// An armed guard. Until told otherwise every invocation is treated as
    /// safety-critical, including ones whose input cannot be parsed.
    pub fn new(out: W) -> Self {
        Self { out, armed: true }
    }

    /// Stop guarding: the event may legitimately end without a decision.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Write the response and disarm.
    pub fn complete(&mut self, response: &HookResponse) -> Result<()> {
        let json = response.to_json()?;
        writeln!(self.out, "{json}").context("write hook response")?;
        self.out.flush().context("flush hook response")?;
        self.armed = false;
        Ok(())
    }
}

impl<W: Write> Drop for CompletionGuard<W> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        error!("hook ended without a decision, writing denial");
        let denial = HookResponse::decision(Decision::deny(ABNORMAL_EXIT_REASON));
        let json = denial
            .to_json()
            .unwrap_or_else(|_| r#"{"decision":"deny"}"#.to_string());
        let _ = writeln!(self.out, "{json}");
        let _ = self.out.flush();
    }
}

/// Route panics through tracing before unwinding reaches the guard.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(panic = %info, "warden panicked");
        if tracing::enabled!(tracing::Level::DEBUG) {
            default_hook(info);
        }
    }));
}
