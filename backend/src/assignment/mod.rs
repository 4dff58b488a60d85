//! Assignment validator.
//!
//! Decides whether a user may be bound as the assignee of a ticket in a given
//! project. The checks are ordered and the first failure wins.

use crate::db::Repository;
use crate::errors::{codes, AppError};
use crate::models::{Project, User};

/// Why a candidate assignee was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentRejection {
    ProjectNotFound,
    UserNotFound,
    CrossOrganization,
    RoleIneligible,
    NotTeamMember,
    InactiveAccount,
}

impl AssignmentRejection {
    pub fn code(&self) -> &'static str {
        match self {
            AssignmentRejection::ProjectNotFound | AssignmentRejection::UserNotFound => {
                codes::NOT_FOUND
            }
            AssignmentRejection::CrossOrganization => codes::ASSIGNEE_CROSS_ORGANIZATION,
            AssignmentRejection::RoleIneligible => codes::ASSIGNEE_ROLE_INELIGIBLE,
            AssignmentRejection::NotTeamMember => codes::ASSIGNEE_NOT_TEAM_MEMBER,
            AssignmentRejection::InactiveAccount => codes::ASSIGNEE_INACTIVE,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AssignmentRejection::ProjectNotFound => "Project not found",
            AssignmentRejection::UserNotFound => "Assignee not found",
            AssignmentRejection::CrossOrganization => {
                "Assignee belongs to a different organization than the project"
            }
            AssignmentRejection::RoleIneligible => "Assignee's role cannot be assigned tickets",
            AssignmentRejection::NotTeamMember => "Assignee is not a member of the project team",
            AssignmentRejection::InactiveAccount => "Assignee's account is inactive",
        }
    }
}

/// Run the ordered checks against already-loaded records.
pub fn check_candidate(
    project: Option<&Project>,
    candidate: Option<&User>,
) -> Result<(), AssignmentRejection> {
    let project = project.ok_or(AssignmentRejection::ProjectNotFound)?;
    let candidate = candidate.ok_or(AssignmentRejection::UserNotFound)?;

    if candidate.organization_id.as_deref() != Some(project.organization_id.as_str()) {
        return Err(AssignmentRejection::CrossOrganization);
    }
    if !candidate.role.is_assignable() {
        return Err(AssignmentRejection::RoleIneligible);
    }
    if !project.is_member(&candidate.id) {
        return Err(AssignmentRejection::NotTeamMember);
    }
    if !candidate.is_active {
        return Err(AssignmentRejection::InactiveAccount);
    }
    Ok(())
}

/// Load the project and candidate and validate the binding.
///
/// Returns the candidate so callers can snapshot its name.
pub async fn validate_assignment(
    repo: &Repository,
    project_id: &str,
    candidate_id: &str,
) -> Result<User, AppError> {
    let project = repo.get_project(project_id).await?;
    let candidate = match project {
        Some(_) => repo.get_user(candidate_id).await?,
        None => None,
    };

    match check_candidate(project.as_ref(), candidate.as_ref()) {
        Ok(()) => Ok(candidate.ok_or(AssignmentRejection::UserNotFound)?),
        Err(reason) => {
            tracing::debug!(
                project_id,
                candidate_id,
                reason = reason.code(),
                "Assignment rejected"
            );
            Err(reason.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::lifecycle::tests_support::{project, user};

    /// Acme's P1 with dev1 (qa) and dev2 (developer) on the team.
    fn acme() -> (Project, User, User) {
        let dev1 = user("dev1", Role::Qa, "acme");
        let dev2 = user("dev2", Role::Developer, "acme");
        let p1 = project("p1", "acme", &[&dev1, &dev2]);
        (p1, dev1, dev2)
    }

    #[test]
    fn test_team_member_is_accepted() {
        let (p1, dev1, dev2) = acme();
        assert_eq!(check_candidate(Some(&p1), Some(&dev2)), Ok(()));
        assert_eq!(check_candidate(Some(&p1), Some(&dev1)), Ok(()));
    }

    #[test]
    fn test_missing_records_fail_first() {
        let (p1, _, dev2) = acme();
        assert_eq!(
            check_candidate(None, Some(&dev2)),
            Err(AssignmentRejection::ProjectNotFound)
        );
        assert_eq!(
            check_candidate(Some(&p1), None),
            Err(AssignmentRejection::UserNotFound)
        );
    }

    #[test]
    fn test_foreign_user_is_cross_organization() {
        let (p1, _, _) = acme();
        let outsider = user("x", Role::Developer, "other");
        assert_eq!(
            check_candidate(Some(&p1), Some(&outsider)),
            Err(AssignmentRejection::CrossOrganization)
        );
    }

    #[test]
    fn test_management_roles_are_ineligible() {
        let (mut p1, _, _) = acme();
        let admin = user("boss", Role::Admin, "acme");
        let pm = user("pm", Role::ProjectManager, "acme");
        p1 = project(&p1.id, "acme", &[&admin, &pm]);
        assert_eq!(
            check_candidate(Some(&p1), Some(&admin)),
            Err(AssignmentRejection::RoleIneligible)
        );
        assert_eq!(
            check_candidate(Some(&p1), Some(&pm)),
            Err(AssignmentRejection::RoleIneligible)
        );
    }

    #[test]
    fn test_non_member_is_rejected() {
        let (p1, _, _) = acme();
        let dev3 = user("dev3", Role::Developer, "acme");
        assert_eq!(
            check_candidate(Some(&p1), Some(&dev3)),
            Err(AssignmentRejection::NotTeamMember)
        );
    }

    #[test]
    fn test_inactive_member_is_rejected() {
        let (p1, _, mut dev2) = acme();
        dev2.is_active = false;
        assert_eq!(
            check_candidate(Some(&p1), Some(&dev2)),
            Err(AssignmentRejection::InactiveAccount)
        );
    }

    #[test]
    fn test_first_failure_wins() {
        let (p1, _, _) = acme();
        let mut outsider = user("x", Role::Admin, "other");
        outsider.is_active = false;
        assert_eq!(
            check_candidate(Some(&p1), Some(&outsider)),
            Err(AssignmentRejection::CrossOrganization)
        );
    }
}
