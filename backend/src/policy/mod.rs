//! Authorization policy: the permission table and the scope resolver.
//!
//! Every role decision in the service layer goes through [`authorize`] and
//! every visibility decision through [`resolve_scope`]. Services never branch
//! on roles themselves.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::identity::{IdentityContext, Role};
use crate::models::{Project, Ticket, User};

/// Kinds of records the policy governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Organization,
    User,
    Project,
    Ticket,
    Comment,
    Activity,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Organization => "organization",
            ResourceKind::User => "user",
            ResourceKind::Project => "project",
            ResourceKind::Ticket => "ticket",
            ResourceKind::Comment => "comment",
            ResourceKind::Activity => "activity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Assign,
    ChangeStatus,
}

/// Outcome of a permission lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Denied,
    /// Allowed on any record inside the actor's scope.
    Scoped,
    /// Allowed only on records the actor is personally involved in
    /// (ticket author/assignee, comment author, activity actor/target).
    Involved,
}

/// The `role x resource x action` table.
pub fn permission(role: Role, resource: ResourceKind, action: Action) -> Access {
    use Access::{Denied, Involved, Scoped};
    use Action::*;
    use ResourceKind as R;

    if role.is_platform() {
        return match (resource, action) {
            (R::Ticket, _) => Scoped,
            (_, Assign | ChangeStatus) => Denied,
            _ => Scoped,
        };
    }

    match (resource, action) {
        (_, Assign | ChangeStatus) if resource != R::Ticket => Denied,

        (R::Organization, Read) => Scoped,
        (R::Organization, _) => Denied,

        (R::User, Read) => Scoped,
        (R::User, Create | Update | Delete) if role.is_management() => Scoped,
        (R::User, _) => Denied,

        (R::Project, Read) => Scoped,
        (R::Project, Create | Update) if role.is_management() || role == Role::Qa => Scoped,
        (R::Project, Delete) if role.is_management() => Scoped,
        (R::Project, _) => Denied,

        (R::Ticket, Read | Create) => Scoped,
        (R::Ticket, _) if role.is_management() => Scoped,
        (R::Ticket, Update | Assign | ChangeStatus) if role == Role::Qa => Scoped,
        (R::Ticket, Update | ChangeStatus) if role == Role::Developer => Involved,
        (R::Ticket, _) => Denied,

        (R::Comment, Read | Create) => Scoped,
        (R::Comment, Update | Delete) if role.is_management() => Scoped,
        (R::Comment, Update | Delete) => Involved,
        (R::Comment, _) => Denied,

        (R::Activity, Read) if role == Role::Developer => Involved,
        (R::Activity, Read) => Scoped,
        (R::Activity, _) => Denied,
    }
}

/// Look up the table for this actor, failing with `Forbidden` on denial.
pub fn authorize(
    identity: &IdentityContext,
    resource: ResourceKind,
    action: Action,
) -> Result<Access, AppError> {
    match permission(identity.role, resource, action) {
        Access::Denied => Err(AppError::Forbidden(format!(
            "Role {} may not {:?} {}",
            identity.role,
            action,
            resource.as_str()
        ))),
        access => Ok(access),
    }
}

/// Apply an `Involved` grant to a ticket.
pub fn require_ticket_involvement(
    access: Access,
    identity: &IdentityContext,
    ticket: &Ticket,
) -> Result<(), AppError> {
    if access == Access::Involved && !ticket.involves(&identity.user_id) {
        return Err(AppError::Forbidden(
            "Only the ticket's author or assignee may do this".to_string(),
        ));
    }
    Ok(())
}

/// How narrowly ticket lists are scoped for developers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketScopeMode {
    /// Every ticket in the organization.
    #[default]
    Organization,
    /// Only tickets the developer authored or is assigned to.
    Involvement,
}

impl TicketScopeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "organization" => Some(TicketScopeMode::Organization),
            "involvement" => Some(TicketScopeMode::Involvement),
            _ => None,
        }
    }
}

/// The actor's authorization boundary for one resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Unrestricted,
    Organization(String),
    Involvement {
        organization_id: String,
        user_id: String,
    },
    Nothing,
}

impl Scope {
    pub fn organization(&self) -> Option<&str> {
        match self {
            Scope::Organization(org) => Some(org),
            Scope::Involvement {
                organization_id, ..
            } => Some(organization_id),
            Scope::Unrestricted | Scope::Nothing => None,
        }
    }

    pub fn admits_organization(&self, organization_id: &str) -> bool {
        match self {
            Scope::Unrestricted => true,
            Scope::Nothing => false,
            _ => self.organization() == Some(organization_id),
        }
    }

    pub fn admits_user(&self, user: &User) -> bool {
        match self {
            Scope::Unrestricted => true,
            Scope::Nothing => false,
            _ => user.organization_id.as_deref() == self.organization(),
        }
    }

    pub fn admits_project(&self, project: &Project) -> bool {
        self.admits_organization(&project.organization_id)
    }

    /// `organization_id` is the ticket's project's organization.
    pub fn admits_ticket(&self, ticket: &Ticket, organization_id: &str) -> bool {
        match self {
            Scope::Involvement { user_id, .. } => {
                self.admits_organization(organization_id) && ticket.involves(user_id)
            }
            _ => self.admits_organization(organization_id),
        }
    }
}

/// Resolve the scope of `identity` over `resource`.
///
/// `organization_filter` narrows platform actors to one organization. For
/// anyone else a filter naming a foreign organization resolves to
/// [`Scope::Nothing`] so that the caller sees an empty result rather than an
/// error revealing whether the organization exists.
pub fn resolve_scope(
    identity: &IdentityContext,
    resource: ResourceKind,
    organization_filter: Option<&str>,
    ticket_mode: TicketScopeMode,
) -> Scope {
    if identity.is_platform() {
        return match organization_filter {
            Some(org) => Scope::Organization(org.to_string()),
            None => Scope::Unrestricted,
        };
    }

    let Some(own) = identity.organization_id.as_deref() else {
        return Scope::Nothing;
    };
    if organization_filter.is_some_and(|org| org != own) {
        return Scope::Nothing;
    }

    let involvement = match resource {
        ResourceKind::Ticket => {
            ticket_mode == TicketScopeMode::Involvement && identity.role == Role::Developer
        }
        ResourceKind::Activity => {
            permission(identity.role, resource, Action::Read) == Access::Involved
        }
        _ => false,
    };

    if involvement {
        Scope::Involvement {
            organization_id: own.to_string(),
            user_id: identity.user_id.clone(),
        }
    } else {
        Scope::Organization(own.to_string())
    }
}

/// A storage-independent query predicate produced from a [`Scope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Everything,
    Nothing,
    /// Record's own organization reference equals the value.
    OrganizationIs(String),
    /// Ticket's project is one of the listed projects.
    ProjectIn(Vec<String>),
    /// Ticket's project is listed and the user authored or holds it.
    ProjectInInvolving {
        project_ids: Vec<String>,
        user_id: String,
    },
    /// Activity record performed by or targeting the user, within the organization.
    InvolvingUser {
        organization_id: String,
        user_id: String,
    },
}

impl Predicate {
    /// Predicate for records carrying their own organization reference
    /// (users, projects, organizations, activities).
    pub fn for_owned(scope: &Scope) -> Self {
        match scope {
            Scope::Unrestricted => Predicate::Everything,
            Scope::Nothing => Predicate::Nothing,
            Scope::Organization(org) => Predicate::OrganizationIs(org.clone()),
            Scope::Involvement {
                organization_id,
                user_id,
            } => Predicate::InvolvingUser {
                organization_id: organization_id.clone(),
                user_id: user_id.clone(),
            },
        }
    }

    /// Predicate for tickets, given the project ids of the scope's organization.
    ///
    /// An organization without projects short-circuits to `Nothing` instead
    /// of an empty membership test.
    pub fn for_tickets(scope: &Scope, organization_project_ids: Vec<String>) -> Self {
        match scope {
            Scope::Unrestricted => Predicate::Everything,
            Scope::Nothing => Predicate::Nothing,
            _ if organization_project_ids.is_empty() => Predicate::Nothing,
            Scope::Organization(_) => Predicate::ProjectIn(organization_project_ids),
            Scope::Involvement { user_id, .. } => Predicate::ProjectInInvolving {
                project_ids: organization_project_ids,
                user_id: user_id.clone(),
            },
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Predicate::Nothing)
    }
}
