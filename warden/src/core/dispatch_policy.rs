//! Predicates deciding whether a new agent run may start.
//!
//! Each predicate is independent; every failing one contributes a reason.

use std::collections::BTreeMap;

use crate::core::types::{GateState, Role};

/// Inputs for a dispatch check, already resolved from disk.
#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    pub role: &'a Role,
    pub gate: GateState,
    /// Roles that currently hold an active marker in this project.
    pub active_roles: &'a [Role],
    pub current_branch: Option<&'a str>,
    /// Branch the run is routed to, when it differs from the current one.
    pub target_branch: Option<&'a str>,
}

/// Dispatch rules from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// `role -> roles that must have finished before it starts`.
    pub prerequisites: BTreeMap<String, Vec<String>>,
    pub commit_roles: Vec<String>,
    pub protected_branches: Vec<String>,
}

impl DispatchPolicy {
    fn is_commit_role(&self, role: &Role) -> bool {
        self.commit_roles
            .iter()
            .any(|name| Role::from(name.as_str()) == *role)
    }

    fn prerequisites_of(&self, role: &Role) -> Vec<Role> {
        self.prerequisites
            .iter()
            .filter(|(name, _)| Role::from(name.as_str()) == *role)
            .flat_map(|(_, before)| before.iter().map(|name| Role::from(name.as_str())))
            .collect()
    }
}

/// Reasons the dispatch is denied; empty means admitted.
pub fn check_dispatch(request: &DispatchRequest<'_>, policy: &DispatchPolicy) -> Vec<String> {
    let role = request.role;
    let mut denials = Vec::new();

    if policy.is_commit_role(role) && !request.gate.permits_commit() {
        denials.push(format!(
            "{role} cannot start: verification gate is {}; verify the work first",
            request.gate
        ));
    }

    for prerequisite in policy.prerequisites_of(role) {
        if request.active_roles.contains(&prerequisite) {
            denials.push(format!(
                "{role} cannot start while {prerequisite} is still active"
            ));
        }
    }

    if role.is_authoring() {
        let branch = request.target_branch.or(request.current_branch);
        if let Some(branch) = branch {
            if policy.protected_branches.iter().any(|p| p == branch) {
                denials.push(format!(
                    "{role} cannot work directly on protected branch '{branch}'; \
                     create a feature branch or work area first"
                ));
            }
        }
    }

    denials
}
