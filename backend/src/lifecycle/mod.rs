//! Lifecycle services.
//!
//! Each service takes the request's [`IdentityContext`](crate::identity::IdentityContext)
//! by reference, consults the policy module for permission and scope, runs
//! the write through the repository and hands the resulting side effects to
//! the [`EffectDispatcher`](crate::events::EffectDispatcher).

mod activities;
mod organizations;
pub mod plan;
mod projects;
mod tickets;
mod users;

pub use activities::ActivityService;
pub use organizations::OrganizationService;
pub use projects::ProjectService;
pub use tickets::TicketEngine;
pub use users::UserService;

use crate::db::Repository;
use crate::errors::AppError;
use crate::events::{EffectDispatcher, SideEffect};

/// Drop notifications the recipient opted out of, then emit the rest.
///
/// Runs after the write has committed and never fails. A recipient that
/// cannot be loaded is treated as having default preferences.
pub(crate) async fn dispatch(repo: &Repository, dispatcher: &EffectDispatcher, effects: Vec<SideEffect>) {
    let mut kept = Vec::with_capacity(effects.len());

    for effect in effects {
        if let SideEffect::NotifyUser {
            user_id,
            notification,
        } = &effect
        {
            match repo.get_user(user_id).await {
                Ok(Some(user)) if !notification.kind.enabled_in(&user.notification_preferences) => {
                    tracing::debug!(%user_id, kind = ?notification.kind, "Notification muted by preferences");
                    continue;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%user_id, "Failed to load notification preferences: {}", e),
            }
        }
        kept.push(effect);
    }

    let report = dispatcher.emit(kept).await;
    if report.failed > 0 {
        tracing::warn!(?report, "Some side effects were not delivered");
    } else {
        tracing::debug!(?report, "Side effects emitted");
    }
}

/// Trimmed, non-empty text or a validation error naming the field.
pub(crate) fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

#[cfg(test)]
pub mod tests_support {
    //! Record builders shared by unit tests.

    use crate::identity::Role;
    use crate::models::{
        NotificationPreferences, Priority, Project, ProjectMember, ProjectStatus, Ticket,
        TicketStatus, User,
    };

    const T0: &str = "2024-01-01T00:00:00.000000Z";

    pub fn user(id: &str, role: Role, org: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("User {}", id),
            email: format!("{}@example.com", id),
            role,
            organization_id: (!role.is_platform()).then(|| org.to_string()),
            is_active: true,
            created_by: None,
            notification_preferences: NotificationPreferences::default(),
            created_at: T0.to_string(),
            updated_at: T0.to_string(),
        }
    }

    pub fn project(id: &str, org: &str, members: &[&User]) -> Project {
        Project {
            id: id.to_string(),
            name: format!("Project {}", id),
            description: String::new(),
            status: ProjectStatus::Active,
            organization_id: org.to_string(),
            created_by: "admin".to_string(),
            team_members: members
                .iter()
                .map(|u| ProjectMember {
                    user_id: u.id.clone(),
                    user_name: u.name.clone(),
                    role: u.role,
                    assigned_at: T0.to_string(),
                })
                .collect(),
            start_date: T0.to_string(),
            end_date: None,
            created_at: T0.to_string(),
            updated_at: T0.to_string(),
        }
    }

    pub fn ticket(id: &str, project_id: &str) -> Ticket {
        Ticket {
            id: id.to_string(),
            title: format!("Ticket {}", id),
            description: String::new(),
            status: TicketStatus::Pending,
            priority: Priority::Medium,
            project_id: project_id.to_string(),
            project_name: format!("Project {}", project_id),
            author_id: "author".to_string(),
            author_name: "Author".to_string(),
            assigned_to_id: None,
            assigned_to_name: None,
            labels: Vec::new(),
            deadline: None,
            created_at: T0.to_string(),
            updated_at: T0.to_string(),
            version: 1,
        }
    }
}
