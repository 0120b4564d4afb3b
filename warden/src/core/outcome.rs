//! Outcome classification for finished agent runs.
//!
//! Precedence: explicit pass/fail signal, then timeout, then skipped (no
//! artifacts at all), then partial (artifacts without a conclusive signal).

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::Outcome;

/// Explicit verdict a run left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Pass,
    Fail,
}

impl Signal {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pass" | "passed" | "success" => Some(Signal::Pass),
            "fail" | "failed" | "failure" => Some(Signal::Fail),
            _ => None,
        }
    }
}

/// Evidence gathered for one run at finalization time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evidence {
    pub signal: Option<Signal>,
    pub artifact_refs: Vec<String>,
    pub duration_secs: u64,
}

static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*RESULT:\s*(PASS|FAIL)\b").expect("result line regex")
});

/// Last `RESULT: PASS|FAIL` line in `output`, if any.
pub fn parse_result_line(output: &str) -> Option<Signal> {
    RESULT_LINE
        .captures_iter(output)
        .last()
        .and_then(|caps| Signal::parse(caps.get(1)?.as_str()))
}

pub fn classify(evidence: &Evidence, timeout_secs: u64) -> Outcome {
    match evidence.signal {
        Some(Signal::Pass) => Outcome::Success,
        Some(Signal::Fail) => Outcome::Failure,
        None if evidence.duration_secs > timeout_secs => Outcome::Timeout,
        None if evidence.artifact_refs.is_empty() => Outcome::Skipped,
        None => Outcome::Partial,
    }
}

/// Guidance naming the evidence a non-conclusive run failed to produce.
pub fn missing_evidence(outcome: Outcome, evidence_dir: &str) -> Option<String> {
    match outcome {
        Outcome::Skipped => Some(format!(
            "verification produced no artifacts; run the checks, save their output under \
             {evidence_dir}, and end with a `RESULT: PASS` or `RESULT: FAIL` line"
        )),
        Outcome::Partial => Some(format!(
            "verification left artifacts in {evidence_dir} but no conclusive result; finish \
             the remaining checks and end with a `RESULT: PASS` or `RESULT: FAIL` line"
        )),
        Outcome::Timeout => Some(
            "verification ran past its time budget without a result; rerun the checks with \
             a narrower scope and report `RESULT: PASS` or `RESULT: FAIL`"
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence(signal: Option<Signal>, artifacts: usize, duration_secs: u64) -> Evidence {
        Evidence {
            signal,
            artifact_refs: (0..artifacts).map(|i| format!("artifact-{i}")).collect(),
            duration_secs,
        }
    }

    #[test]
    fn signal_wins_over_everything() {
        assert_eq!(classify(&evidence(Some(Signal::Pass), 0, 99_999), 60), Outcome::Success);
        assert_eq!(classify(&evidence(Some(Signal::Fail), 3, 1), 60), Outcome::Failure);
    }

    #[test]
    fn timeout_before_skipped_and_partial() {
        assert_eq!(classify(&evidence(None, 0, 61), 60), Outcome::Timeout);
        assert_eq!(classify(&evidence(None, 2, 61), 60), Outcome::Timeout);
        assert_eq!(classify(&evidence(None, 0, 60), 60), Outcome::Skipped);
    }

    #[test]
    fn artifacts_without_signal_are_partial() {
        assert_eq!(classify(&evidence(None, 1, 5), 60), Outcome::Partial);
    }

    #[test]
    fn last_result_line_counts() {
        let output = "RESULT: FAIL\nfixed it\n  result: pass\n";
        assert_eq!(parse_result_line(output), Some(Signal::Pass));
        assert_eq!(parse_result_line("the RESULT: PASS is inline"), None);
        assert_eq!(parse_result_line("no verdict"), None);
    }

    #[test]
    fn guidance_only_for_inconclusive_outcomes() {
        assert!(missing_evidence(Outcome::Skipped, "/tmp/e").is_some_and(|g| g.contains("/tmp/e")));
        assert!(missing_evidence(Outcome::Partial, "/tmp/e").is_some());
        assert!(missing_evidence(Outcome::Success, "/tmp/e").is_none());
    }
}
