//! Actor identity and role model.
//!
//! An [`IdentityContext`] is built once per request by the auth middleware and
//! handed by value to every service, so authorization decisions within one
//! request all see the same snapshot of the actor.

use serde::{Deserialize, Serialize};

/// Closed set of roles across both deployment variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Superadmin,
    Admin,
    ProjectManager,
    Developer,
    Qa,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::ProjectManager => "project-manager",
            Role::Developer => "developer",
            Role::Qa => "qa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superadmin" => Some(Role::Superadmin),
            "admin" => Some(Role::Admin),
            "project-manager" => Some(Role::ProjectManager),
            "developer" => Some(Role::Developer),
            "qa" => Some(Role::Qa),
            _ => None,
        }
    }

    /// Platform roles live outside any organization.
    pub fn is_platform(&self) -> bool {
        matches!(self, Role::Superadmin)
    }

    /// Organization management tier (admin or project-manager).
    pub fn is_management(&self) -> bool {
        matches!(self, Role::Admin | Role::ProjectManager)
    }

    /// Roles that may be bound as a ticket assignee.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Role::Developer | Role::Qa)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which management role a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleVariant {
    Admin,
    ProjectManager,
}

impl RoleVariant {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(RoleVariant::Admin),
            "project-manager" => Some(RoleVariant::ProjectManager),
            _ => None,
        }
    }

    /// The organization management role of this deployment.
    pub fn management_role(&self) -> Role {
        match self {
            RoleVariant::Admin => Role::Admin,
            RoleVariant::ProjectManager => Role::ProjectManager,
        }
    }

    /// Whether a role can be held by a user of this deployment.
    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Admin | Role::ProjectManager => role == self.management_role(),
            Role::Superadmin | Role::Developer | Role::Qa => true,
        }
    }
}

/// Immutable snapshot of the authenticated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub organization_id: Option<String>,
    pub active: bool,
}

impl IdentityContext {
    pub fn is_platform(&self) -> bool {
        self.role.is_platform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_strings() {
        for role in [
            Role::Superadmin,
            Role::Admin,
            Role::ProjectManager,
            Role::Developer,
            Role::Qa,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_role_serializes_kebab_case() {
        let json = serde_json::to_string(&Role::ProjectManager).unwrap();
        assert_eq!(json, "\"project-manager\"");
    }

    #[test]
    fn test_variant_supports_one_management_role() {
        assert!(RoleVariant::Admin.supports(Role::Admin));
        assert!(!RoleVariant::Admin.supports(Role::ProjectManager));
        assert!(RoleVariant::ProjectManager.supports(Role::ProjectManager));
        assert!(!RoleVariant::ProjectManager.supports(Role::Admin));
        assert!(RoleVariant::ProjectManager.supports(Role::Qa));
    }

    #[test]
    fn test_only_developer_and_qa_are_assignable() {
        assert!(Role::Developer.is_assignable());
        assert!(Role::Qa.is_assignable());
        assert!(!Role::Admin.is_assignable());
        assert!(!Role::ProjectManager.is_assignable());
        assert!(!Role::Superadmin.is_assignable());
    }
}
