//! Warden configuration stored under `.warden/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::dispatch_policy::DispatchPolicy;
use crate::core::rubric::RubricPolicy;
use crate::io::state_store::write_atomic;

/// Warden configuration (TOML).
///
/// Edited by humans; every field is optional and defaults to the values
/// below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WardenConfig {
    /// Branches an implementing run may not work on directly, and that
    /// force-pushes may not target.
    pub protected_branches: Vec<String>,

    /// A test status older than this is treated as absent.
    pub test_status_max_age_secs: u64,

    /// Active markers older than this are reclassified as crashed.
    pub orphan_threshold_secs: u64,

    /// An unsignaled run longer than this finalizes as `timeout`.
    pub trace_timeout_secs: u64,

    /// Prompt prefixes the confirmation relay accepts as human approval.
    pub affirmations: Vec<String>,

    /// Command prefixes that run the test suite (e.g. `cargo test`).
    pub test_commands: Vec<String>,

    pub rubric: RubricConfig,

    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RubricConfig {
    pub min_confidence: u8,
    /// "Untested" admissions containing one of these phrases are tolerated.
    pub environment_gaps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Roles that issue commits and therefore need a commit-permitting gate.
    pub commit_roles: Vec<String>,
    /// `role = [roles that must not be active when it starts]`.
    pub prerequisites: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RubricConfig {
    fn default() -> Self {
        Self {
            min_confidence: 90,
            environment_gaps: strings(&[
                "requires a physical device",
                "requires hardware",
                "requires production credentials",
                "requires network access",
                "no display available",
                "requires manual ui",
                "third-party service",
            ]),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let mut prerequisites = BTreeMap::new();
        prerequisites.insert("verifier".to_string(), strings(&["implementer"]));
        prerequisites.insert("reviewer".to_string(), strings(&["verifier"]));
        prerequisites.insert("shipper".to_string(), strings(&["reviewer"]));
        Self {
            commit_roles: strings(&["shipper"]),
            prerequisites,
        }
    }
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            protected_branches: strings(&["main", "master"]),
            test_status_max_age_secs: 15 * 60,
            orphan_threshold_secs: 2 * 60 * 60,
            trace_timeout_secs: 30 * 60,
            affirmations: strings(&[
                "verified",
                "confirmed",
                "lgtm",
                "looks good",
                "ship it",
                "approved",
            ]),
            test_commands: strings(&[
                "cargo test",
                "cargo nextest",
                "npm test",
                "pnpm test",
                "yarn test",
                "pytest",
                "go test",
                "just test",
                "make test",
            ]),
            rubric: RubricConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl WardenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.test_status_max_age_secs == 0 {
            return Err(anyhow!("test_status_max_age_secs must be > 0"));
        }
        if self.orphan_threshold_secs == 0 {
            return Err(anyhow!("orphan_threshold_secs must be > 0"));
        }
        if self.trace_timeout_secs == 0 {
            return Err(anyhow!("trace_timeout_secs must be > 0"));
        }
        if self.rubric.min_confidence == 0 || self.rubric.min_confidence > 100 {
            return Err(anyhow!("rubric.min_confidence must be within 1..=100"));
        }
        if self.affirmations.iter().any(|a| a.trim().is_empty()) {
            return Err(anyhow!("affirmations must not contain empty tokens"));
        }
        if self.test_commands.iter().any(|c| c.trim().is_empty()) {
            return Err(anyhow!("test_commands must not contain empty commands"));
        }
        for (role, before) in &self.dispatch.prerequisites {
            if before.iter().any(|r| r == role) {
                return Err(anyhow!("dispatch.prerequisites: {role} cannot depend on itself"));
            }
        }
        Ok(())
    }

    pub fn rubric_policy(&self) -> RubricPolicy {
        RubricPolicy {
            min_confidence: self.rubric.min_confidence,
            environment_gaps: self.rubric.environment_gaps.clone(),
        }
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            prerequisites: self.dispatch.prerequisites.clone(),
            commit_roles: self.dispatch.commit_roles.clone(),
            protected_branches: self.protected_branches.clone(),
        }
    }

    /// True when `command` starts with a configured test command.
    pub fn is_test_command(&self, command: &str) -> bool {
        let words: Vec<&str> = command.split_whitespace().collect();
        self.test_commands.iter().any(|prefix| {
            let prefix: Vec<&str> = prefix.split_whitespace().collect();
            !prefix.is_empty() && words.starts_with(&prefix)
        })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WardenConfig::default()`.
pub fn load_config(path: &Path) -> Result<WardenConfig> {
    if !path.exists() {
        let cfg = WardenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WardenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk.
pub fn write_config(path: &Path, cfg: &WardenConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
