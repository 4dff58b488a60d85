//! Ticket lifecycle engine.

use crate::assignment::validate_assignment;
use crate::db::Repository;
use crate::errors::AppError;
use crate::events::{now, EffectDispatcher, SideEffect};
use crate::identity::IdentityContext;
use crate::models::{
    normalize_labels, Activity, AssignTicketRequest, Comment, CreateCommentRequest,
    CreateTicketRequest, Page, Ticket, TicketListQuery, TicketStatus, UpdateStatusRequest,
    UpdateTicketRequest, User,
};
use crate::policy::{
    authorize, require_ticket_involvement, resolve_scope, Access, Action, Predicate,
    ResourceKind, Scope, TicketScopeMode,
};

use super::plan::{self, AssigneeChange, EffectContext};
use super::{dispatch, required};

/// A ticket together with its project's organization.
struct Located {
    ticket: Ticket,
    /// `None` when the project no longer exists.
    organization_id: Option<String>,
}

impl Located {
    fn admitted_by(&self, scope: &Scope) -> bool {
        match &self.organization_id {
            Some(org) => scope.admits_ticket(&self.ticket, org),
            None => *scope == Scope::Unrestricted,
        }
    }

    fn context<'a>(&'a self, actor: &'a IdentityContext) -> EffectContext<'a> {
        EffectContext {
            actor,
            organization_id: self.organization_id.as_deref(),
        }
    }
}

/// Owns the ticket state machine. Every ticket mutation goes through here.
#[derive(Clone)]
pub struct TicketEngine {
    repo: Repository,
    effects: EffectDispatcher,
    scope_mode: TicketScopeMode,
}

impl TicketEngine {
    pub fn new(repo: Repository, effects: EffectDispatcher, scope_mode: TicketScopeMode) -> Self {
        Self {
            repo,
            effects,
            scope_mode,
        }
    }

    /// Ticket predicate for `identity`, materialized against the scope's projects.
    pub async fn predicate(
        &self,
        identity: &IdentityContext,
        organization_filter: Option<&str>,
    ) -> Result<Predicate, AppError> {
        let scope = resolve_scope(
            identity,
            ResourceKind::Ticket,
            organization_filter,
            self.scope_mode,
        );
        let project_ids = match scope.organization() {
            Some(org) => self.repo.project_ids_for_organization(org).await?,
            None => Vec::new(),
        };
        Ok(Predicate::for_tickets(&scope, project_ids))
    }

    pub async fn list(
        &self,
        identity: &IdentityContext,
        query: &TicketListQuery,
    ) -> Result<Page<Ticket>, AppError> {
        authorize(identity, ResourceKind::Ticket, Action::Read)?;
        let predicate = self
            .predicate(identity, query.organization_id.as_deref())
            .await?;
        self.repo.list_tickets(&predicate, query).await
    }

    pub async fn get(&self, identity: &IdentityContext, id: &str) -> Result<Ticket, AppError> {
        authorize(identity, ResourceKind::Ticket, Action::Read)?;
        Ok(self.load_visible(identity, id).await?.ticket)
    }

    pub async fn create(
        &self,
        identity: &IdentityContext,
        request: &CreateTicketRequest,
    ) -> Result<Ticket, AppError> {
        authorize(identity, ResourceKind::Ticket, Action::Create)?;
        let title = required(&request.title, "Title")?;
        let project_id = required(&request.project_id, "Project")?;

        let project = self
            .repo
            .get_project(&project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", project_id)))?;
        let scope = resolve_scope(
            identity,
            ResourceKind::Project,
            None,
            TicketScopeMode::Organization,
        );
        if !scope.admits_project(&project) {
            return Err(AppError::Forbidden(
                "Project belongs to another organization".to_string(),
            ));
        }

        let assignee = match request
            .assigned_to_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(candidate) => {
                authorize(identity, ResourceKind::Ticket, Action::Assign)?;
                Some(validate_assignment(&self.repo, &project.id, candidate).await?)
            }
            None => None,
        };

        let now = now();
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            description: request.description.clone(),
            status: if assignee.is_some() {
                TicketStatus::Assigned
            } else {
                TicketStatus::Pending
            },
            priority: request.priority,
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            author_id: identity.user_id.clone(),
            author_name: identity.name.clone(),
            assigned_to_id: assignee.as_ref().map(|u| u.id.clone()),
            assigned_to_name: assignee.as_ref().map(|u| u.name.clone()),
            labels: normalize_labels(&request.labels),
            deadline: request
                .deadline
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        self.repo.insert_ticket(&ticket).await?;
        tracing::info!(ticket_id = %ticket.id, project_id = %ticket.project_id, "Ticket created");

        let ctx = EffectContext {
            actor: identity,
            organization_id: Some(&project.organization_id),
        };
        let effects = plan::created_effects(ctx, &ticket, assignee.as_ref());
        dispatch(&self.repo, &self.effects, effects).await;

        Ok(ticket)
    }

    pub async fn update(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdateTicketRequest,
    ) -> Result<Ticket, AppError> {
        let access = authorize(identity, ResourceKind::Ticket, Action::Update)?;
        let located = self.load_for_write(identity, id).await?;
        let before = &located.ticket;
        require_ticket_involvement(access, identity, before)?;
        check_version(before, request.expected_version)?;

        let changes = plan::diff(before, request)?;
        if changes.is_empty() {
            return Ok(before.clone());
        }

        let assignee: Option<User> = match &changes.assignee {
            Some(AssigneeChange::Set(candidate)) => {
                authorize(identity, ResourceKind::Ticket, Action::Assign)?;
                Some(validate_assignment(&self.repo, &before.project_id, candidate).await?)
            }
            Some(AssigneeChange::Clear) => {
                authorize(identity, ResourceKind::Ticket, Action::Assign)?;
                None
            }
            None => None,
        };

        let summary = changes.summary(before, assignee.as_ref());
        let mut next = plan::apply(before, &changes, assignee.as_ref(), &now());
        next.version = self
            .repo
            .update_ticket(&next, request.expected_version)
            .await?;

        let effects = plan::updated_effects(
            located.context(identity),
            before,
            &next,
            &summary,
            assignee.as_ref(),
        );
        dispatch(&self.repo, &self.effects, effects).await;

        Ok(next)
    }

    pub async fn assign(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &AssignTicketRequest,
    ) -> Result<Ticket, AppError> {
        let access = authorize(identity, ResourceKind::Ticket, Action::Assign)?;
        let located = self.load_for_write(identity, id).await?;
        let before = &located.ticket;
        require_ticket_involvement(access, identity, before)?;
        check_version(before, request.expected_version)?;

        let candidate = required(&request.assigned_to_id, "Assignee")?;
        let assignee = validate_assignment(&self.repo, &before.project_id, &candidate).await?;

        let mut next = plan::assign(before, &assignee, &now());
        next.version = self
            .repo
            .update_ticket(&next, request.expected_version)
            .await?;
        tracing::info!(ticket_id = %next.id, assignee = %assignee.id, "Ticket assigned");

        let effects = plan::assigned_effects(located.context(identity), before, &next, &assignee);
        dispatch(&self.repo, &self.effects, effects).await;

        Ok(next)
    }

    pub async fn update_status(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdateStatusRequest,
    ) -> Result<Ticket, AppError> {
        let access = authorize(identity, ResourceKind::Ticket, Action::ChangeStatus)?;
        let located = self.load_for_write(identity, id).await?;
        let before = &located.ticket;
        require_ticket_involvement(access, identity, before)?;
        check_version(before, request.expected_version)?;

        let mut next = plan::transition(before, request.status, &now())?;
        next.version = self
            .repo
            .update_ticket(&next, request.expected_version)
            .await?;
        tracing::info!(
            ticket_id = %next.id,
            from = before.status.as_str(),
            to = next.status.as_str(),
            "Ticket status changed"
        );

        let effects = plan::status_effects(located.context(identity), before, &next);
        dispatch(&self.repo, &self.effects, effects).await;

        Ok(next)
    }

    /// Hard delete. Audit history and comments stay behind.
    pub async fn delete(&self, identity: &IdentityContext, id: &str) -> Result<(), AppError> {
        authorize(identity, ResourceKind::Ticket, Action::Delete)?;
        let located = self.load_for_write(identity, id).await?;

        if !self.repo.delete_ticket(id).await? {
            return Err(AppError::NotFound(format!("Ticket {} not found", id)));
        }
        tracing::info!(ticket_id = %id, "Ticket deleted");

        let effects = vec![SideEffect::broadcast_project(
            &located.ticket.project_id,
            serde_json::json!({ "type": "ticket_deleted", "ticketId": id }),
        )];
        dispatch(&self.repo, &self.effects, effects).await;
        Ok(())
    }

    /// Audit history of a ticket, newest first.
    pub async fn history(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> Result<Vec<Activity>, AppError> {
        authorize(identity, ResourceKind::Ticket, Action::Read)?;
        self.load_visible(identity, id).await?;
        self.repo.activities_for_ticket(id).await
    }

    // ==================== COMMENTS ====================

    pub async fn comments(
        &self,
        identity: &IdentityContext,
        ticket_id: &str,
    ) -> Result<Vec<Comment>, AppError> {
        authorize(identity, ResourceKind::Comment, Action::Read)?;
        self.load_visible(identity, ticket_id).await?;
        self.repo.list_comments(ticket_id).await
    }

    pub async fn add_comment(
        &self,
        identity: &IdentityContext,
        ticket_id: &str,
        request: &CreateCommentRequest,
    ) -> Result<Comment, AppError> {
        authorize(identity, ResourceKind::Comment, Action::Create)?;
        let located = self.load_for_write(identity, ticket_id).await?;
        let content = required(&request.content, "Comment")?;

        let comment = Comment {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: ticket_id.to_string(),
            author_id: identity.user_id.clone(),
            author_name: identity.name.clone(),
            content,
            created_at: now(),
        };
        self.repo.insert_comment(&comment).await?;

        let effects = plan::comment_effects(located.context(identity), &located.ticket, &comment);
        dispatch(&self.repo, &self.effects, effects).await;

        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        identity: &IdentityContext,
        ticket_id: &str,
        comment_id: &str,
    ) -> Result<(), AppError> {
        let access = authorize(identity, ResourceKind::Comment, Action::Delete)?;
        self.load_for_write(identity, ticket_id).await?;

        let comment = self
            .repo
            .get_comment(comment_id)
            .await?
            .filter(|c| c.ticket_id == ticket_id)
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;

        if access == Access::Involved && comment.author_id != identity.user_id {
            return Err(AppError::Forbidden(
                "Only the comment's author may delete it".to_string(),
            ));
        }

        self.repo.delete_comment(comment_id).await?;
        Ok(())
    }

    // ==================== LOADING ====================

    async fn locate(&self, id: &str) -> Result<Option<Located>, AppError> {
        let Some(ticket) = self.repo.get_ticket(id).await? else {
            return Ok(None);
        };
        let organization_id = self.repo.project_organization(&ticket.project_id).await?;
        Ok(Some(Located {
            ticket,
            organization_id,
        }))
    }

    /// Read path: an out-of-scope ticket is indistinguishable from an absent one.
    async fn load_visible(&self, identity: &IdentityContext, id: &str) -> Result<Located, AppError> {
        let not_found = || AppError::NotFound(format!("Ticket {} not found", id));
        let located = self.locate(id).await?.ok_or_else(not_found)?;

        let scope = resolve_scope(identity, ResourceKind::Ticket, None, self.scope_mode);
        if !located.admitted_by(&scope) {
            return Err(not_found());
        }
        Ok(located)
    }

    /// Write path: absent is `NotFound`, another organization's ticket is `Forbidden`.
    async fn load_for_write(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> Result<Located, AppError> {
        let located = self
            .locate(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", id)))?;

        let scope = resolve_scope(
            identity,
            ResourceKind::Ticket,
            None,
            TicketScopeMode::Organization,
        );
        if !located.admitted_by(&scope) {
            return Err(AppError::Forbidden(
                "Ticket belongs to another organization".to_string(),
            ));
        }
        Ok(located)
    }
}

/// Fail fast on a stale version token; the conditional write catches races.
fn check_version(ticket: &Ticket, expected: Option<i64>) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != ticket.version => Err(AppError::VersionMismatch {
            message: format!(
                "Version mismatch: expected {}, current {}",
                expected, ticket.version
            ),
            current_version: ticket.version,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests_support::ticket;

    #[test]
    fn test_check_version() {
        let t = ticket("t1", "p1");
        assert!(check_version(&t, None).is_ok());
        assert!(check_version(&t, Some(1)).is_ok());
        match check_version(&t, Some(4)) {
            Err(AppError::VersionMismatch {
                current_version, ..
            }) => assert_eq!(current_version, 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_orphaned_ticket_visible_only_to_platform() {
        let located = Located {
            ticket: ticket("t1", "gone"),
            organization_id: None,
        };
        assert!(located.admitted_by(&Scope::Unrestricted));
        assert!(!located.admitted_by(&Scope::Organization("acme".to_string())));
    }
}
