//! Auto-verification rubric over a reviewing run's own output.
//!
//! Every criterion must hold. Anything ambiguous fails the rubric, which
//! routes the gate to human confirmation instead.

use std::sync::LazyLock;

use regex::Regex;

/// Rubric thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricPolicy {
    /// Minimum self-reported confidence percentage.
    pub min_confidence: u8,
    /// "Untested" admissions mentioning one of these phrases are inherent to
    /// the environment and do not fail the rubric (case-insensitive).
    pub environment_gaps: Vec<String>,
}

/// Rubric result with the reasons it failed (empty when passed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RubricVerdict {
    pub failures: Vec<String>,
}

impl RubricVerdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

static CONFIDENCE_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bconfidence\b[^0-9\n]{0,20}?(\d+)\s*%").expect("confidence regex")
});

static CONFIDENCE_HIGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:confidence\s*[:=]\s*(?:very\s+)?high|(?:very\s+)?high\s+confidence)\b")
        .expect("high confidence regex")
});

static CONFIDENCE_WEAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:confidence\s*[:=]\s*(?:medium|moderate|low)",
        r"|(?:medium|moderate|low)\s+confidence)\b",
    ))
    .expect("weak confidence regex")
});

static HEDGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:not\s+(?:entirely\s+|fully\s+|completely\s+|totally\s+)?",
        r"(?:confident|sure|certain)|unsure|uncertain)\b",
    ))
    .expect("hedge regex")
});

static PARTIAL_COVERAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:partial(?:ly)?\s+(?:coverage|covered|tested|verified)",
        r"|incomplete\s+(?:coverage|testing)",
        r"|not\s+all\s+(?:tests|cases|paths)",
        r"|some\s+(?:tests|cases)\s+(?:were\s+)?(?:skipped|not\s+run))\b",
    ))
    .expect("partial coverage regex")
});

static UNTESTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:untested|not\s+(?:been\s+)?tested",
        r"|could\s+not\s+(?:test|verify|run)",
        r"|couldn't\s+(?:test|verify|run)",
        r"|unable\s+to\s+(?:test|verify|run))\b",
    ))
    .expect("untested regex")
});

/// Score `output` against `policy`.
pub fn score(output: &str, policy: &RubricPolicy) -> RubricVerdict {
    let mut failures = Vec::new();

    let mut percentages = Vec::new();
    for caps in CONFIDENCE_PERCENT.captures_iter(output) {
        let text = &caps[1];
        match text.parse::<u32>() {
            Ok(value) if value <= 100 => percentages.push(value),
            _ => failures.push(format!("malformed confidence '{text}%'")),
        }
    }
    let malformed = !failures.is_empty();
    let reported_high = CONFIDENCE_HIGH.is_match(output);
    match percentages.iter().min() {
        Some(&lowest) if lowest < u32::from(policy.min_confidence) => failures.push(format!(
            "self-reported confidence {lowest}% is below {}%",
            policy.min_confidence
        )),
        Some(_) => {}
        None if reported_high || malformed => {}
        None => failures.push("no self-reported confidence".to_string()),
    }

    if let Some(found) = HEDGED.find(output) {
        failures.push(format!("hedged confidence: '{}'", found.as_str()));
    }

    if CONFIDENCE_WEAK.is_match(output) {
        failures.push("medium or low confidence marker present".to_string());
    }

    if let Some(found) = PARTIAL_COVERAGE.find(output) {
        failures.push(format!("partial coverage admitted: '{}'", found.as_str()));
    }

    for line in output.lines() {
        if !UNTESTED.is_match(line) {
            continue;
        }
        let lowered = line.to_lowercase();
        let whitelisted = policy
            .environment_gaps
            .iter()
            .any(|gap| !gap.trim().is_empty() && lowered.contains(&gap.trim().to_lowercase()));
        if !whitelisted {
            failures.push(format!("untested admission: '{}'", line.trim()));
        }
    }

    RubricVerdict { failures }
}
