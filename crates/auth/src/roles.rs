use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings at this layer; ranking them is the job of a
/// [`RolePolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const SUPERVISOR: Role = Role(Cow::Borrowed("supervisor"));
    pub const STAFF: Role = Role(Cow::Borrowed("staff"));
    pub const AUDITOR: Role = Role(Cow::Borrowed("auditor"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RolePolicyError {
    #[error("role policy has no roles")]
    Empty,

    #[error("duplicate role '{0}' in policy")]
    DuplicateRole(String),

    #[error("minimum approver role '{0}' is not part of the policy")]
    UnknownApproverRole(String),

    #[error("role policy has {0} roles; at most 255 are supported")]
    TooManyRoles(usize),
}

/// Ordered role hierarchy plus the minimum role allowed to review requests.
///
/// Built once and injected wherever a role decision is needed. Roles are
/// listed from least to most privileged; a role's level is its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    levels: HashMap<Role, u8>,
    min_approver_level: u8,
}

impl RolePolicy {
    /// Build a policy from roles ordered least → most privileged.
    pub fn new(ordered: Vec<Role>, min_approver: Role) -> Result<Self, RolePolicyError> {
        if ordered.is_empty() {
            return Err(RolePolicyError::Empty);
        }

        let count = ordered.len();
        let mut levels = HashMap::with_capacity(count);
        for (idx, role) in ordered.into_iter().enumerate() {
            let level = u8::try_from(idx + 1).map_err(|_| RolePolicyError::TooManyRoles(count))?;
            let name = role.as_str().to_string();
            if levels.insert(role, level).is_some() {
                return Err(RolePolicyError::DuplicateRole(name));
            }
        }

        let min_approver_level = *levels
            .get(&min_approver)
            .ok_or_else(|| RolePolicyError::UnknownApproverRole(min_approver.to_string()))?;

        Ok(Self {
            levels,
            min_approver_level,
        })
    }

    /// Level of a role, `None` for roles outside the policy.
    pub fn level(&self, role: &Role) -> Option<u8> {
        self.levels.get(role).copied()
    }

    /// Whether `role` ranks at or above `min`. Unknown roles never qualify.
    pub fn has_at_least(&self, role: &Role, min: &Role) -> bool {
        match (self.level(role), self.level(min)) {
            (Some(have), Some(need)) => have >= need,
            _ => false,
        }
    }

    /// Whether `role` may approve or reject requests.
    pub fn can_approve(&self, role: &Role) -> bool {
        self.level(role)
            .is_some_and(|level| level >= self.min_approver_level)
    }
}

impl Default for RolePolicy {
    /// `auditor < staff < supervisor < admin`, supervisors and up review.
    fn default() -> Self {
        Self {
            levels: HashMap::from([
                (Role::AUDITOR, 1),
                (Role::STAFF, 2),
                (Role::SUPERVISOR, 3),
                (Role::ADMIN, 4),
            ]),
            min_approver_level: 3,
        }
    }
}
