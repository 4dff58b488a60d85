//! Project lifecycle and team rosters.

use crate::db::Repository;
use crate::errors::AppError;
use crate::events::{now, EffectDispatcher, SideEffect};
use crate::identity::IdentityContext;
use crate::models::{
    AddMemberRequest, CreateProjectRequest, Page, Project, ProjectListQuery, ProjectMember,
    ProjectStatus, UpdateProjectRequest, User,
};
use crate::policy::{
    authorize, resolve_scope, Action, Predicate, ResourceKind, Scope, TicketScopeMode,
};

use super::{dispatch, required};

#[derive(Clone)]
pub struct ProjectService {
    repo: Repository,
    effects: EffectDispatcher,
}

impl ProjectService {
    pub fn new(repo: Repository, effects: EffectDispatcher) -> Self {
        Self { repo, effects }
    }

    fn scope(&self, identity: &IdentityContext, organization_filter: Option<&str>) -> Scope {
        resolve_scope(
            identity,
            ResourceKind::Project,
            organization_filter,
            TicketScopeMode::Organization,
        )
    }

    pub async fn list(
        &self,
        identity: &IdentityContext,
        query: &ProjectListQuery,
    ) -> Result<Page<Project>, AppError> {
        authorize(identity, ResourceKind::Project, Action::Read)?;
        let scope = self.scope(identity, query.organization_id.as_deref());
        self.repo
            .list_projects(&Predicate::for_owned(&scope), query)
            .await
    }

    pub async fn get(&self, identity: &IdentityContext, id: &str) -> Result<Project, AppError> {
        authorize(identity, ResourceKind::Project, Action::Read)?;
        let not_found = || AppError::NotFound(format!("Project {} not found", id));

        let project = self.repo.get_project(id).await?.ok_or_else(not_found)?;
        if !self.scope(identity, None).admits_project(&project) {
            return Err(not_found());
        }
        Ok(project)
    }

    pub async fn create(
        &self,
        identity: &IdentityContext,
        request: &CreateProjectRequest,
    ) -> Result<Project, AppError> {
        authorize(identity, ResourceKind::Project, Action::Create)?;
        let name = required(&request.name, "Name")?;

        let organization_id = if identity.is_platform() {
            let org = request.organization_id.as_deref().ok_or_else(|| {
                AppError::Validation("Organization is required".to_string())
            })?;
            if self.repo.get_organization(org).await?.is_none() {
                return Err(AppError::NotFound(format!("Organization {} not found", org)));
            }
            org.to_string()
        } else {
            let own = identity
                .organization_id
                .clone()
                .ok_or_else(|| AppError::Forbidden("Actor has no organization".to_string()))?;
            if request
                .organization_id
                .as_deref()
                .is_some_and(|org| org != own)
            {
                return Err(AppError::Forbidden(
                    "Projects can only be created in your own organization".to_string(),
                ));
            }
            own
        };

        let now = now();
        let mut team_members = Vec::with_capacity(request.team_member_ids.len());
        for user_id in &request.team_member_ids {
            if team_members
                .iter()
                .any(|m: &ProjectMember| &m.user_id == user_id)
            {
                continue;
            }
            let user = self.member_candidate(&organization_id, user_id).await?;
            team_members.push(snapshot(&user, &now));
        }

        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description: request.description.clone(),
            status: request.status.unwrap_or(ProjectStatus::Active),
            organization_id,
            created_by: identity.user_id.clone(),
            team_members,
            start_date: request.start_date.clone().unwrap_or_else(|| now.clone()),
            end_date: request.end_date.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.repo.insert_project(&project).await?;
        tracing::info!(
            project_id = %project.id,
            organization_id = %project.organization_id,
            members = project.team_members.len(),
            "Project created"
        );
        Ok(project)
    }

    pub async fn update(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdateProjectRequest,
    ) -> Result<Project, AppError> {
        authorize(identity, ResourceKind::Project, Action::Update)?;
        let mut project = self.load_for_write(identity, id).await?;

        if let Some(name) = &request.name {
            project.name = required(name, "Name")?;
        }
        if let Some(description) = &request.description {
            project.description = description.clone();
        }
        if let Some(status) = request.status {
            project.status = status;
        }
        if let Some(start_date) = &request.start_date {
            project.start_date = start_date.clone();
        }
        if let Some(end_date) = &request.end_date {
            project.end_date = end_date.clone();
        }
        project.updated_at = now();

        self.repo.update_project(&project).await?;
        self.announce(&project, "updated").await;
        Ok(project)
    }

    /// Delete a project and its roster. Tickets keep their project name
    /// snapshot and become visible to the platform role only.
    pub async fn delete(&self, identity: &IdentityContext, id: &str) -> Result<(), AppError> {
        authorize(identity, ResourceKind::Project, Action::Delete)?;
        self.load_for_write(identity, id).await?;
        self.repo.delete_project(id).await?;
        tracing::info!(project_id = %id, "Project deleted");
        Ok(())
    }

    pub async fn add_member(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &AddMemberRequest,
    ) -> Result<Project, AppError> {
        authorize(identity, ResourceKind::Project, Action::Update)?;
        let project = self.load_for_write(identity, id).await?;
        if project.is_member(&request.user_id) {
            return Err(AppError::Conflict(format!(
                "User {} is already a member of this project",
                request.user_id
            )));
        }

        let user = self
            .member_candidate(&project.organization_id, &request.user_id)
            .await?;
        let now = now();
        self.repo
            .add_project_member(&project.id, &snapshot(&user, &now))
            .await?;

        let project = self.reload(id).await?;
        self.announce(&project, "member_added").await;
        Ok(project)
    }

    pub async fn remove_member(
        &self,
        identity: &IdentityContext,
        id: &str,
        user_id: &str,
    ) -> Result<Project, AppError> {
        authorize(identity, ResourceKind::Project, Action::Update)?;
        let project = self.load_for_write(identity, id).await?;

        let removed = self
            .repo
            .remove_project_member(&project.id, user_id, &now())
            .await?;
        if !removed {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of this project",
                user_id
            )));
        }

        let project = self.reload(id).await?;
        self.announce(&project, "member_removed").await;
        Ok(project)
    }

    // ==================== HELPERS ====================

    /// A user that may join a roster in `organization_id`.
    async fn member_candidate(&self, organization_id: &str, user_id: &str) -> Result<User, AppError> {
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        if user.role.is_platform() {
            return Err(AppError::Validation(
                "Platform administrators cannot join project teams".to_string(),
            ));
        }
        if user.organization_id.as_deref() != Some(organization_id) {
            return Err(AppError::Validation(format!(
                "User {} belongs to a different organization",
                user.name
            )));
        }
        Ok(user)
    }

    async fn load_for_write(&self, identity: &IdentityContext, id: &str) -> Result<Project, AppError> {
        let project = self.reload(id).await?;
        if !self.scope(identity, None).admits_project(&project) {
            return Err(AppError::Forbidden(
                "Project belongs to another organization".to_string(),
            ));
        }
        Ok(project)
    }

    async fn reload(&self, id: &str) -> Result<Project, AppError> {
        self.repo
            .get_project(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))
    }

    async fn announce(&self, project: &Project, change: &str) {
        let effect = SideEffect::broadcast_project(
            &project.id,
            serde_json::json!({ "type": "project_updated", "change": change, "project": project }),
        );
        dispatch(&self.repo, &self.effects, vec![effect]).await;
    }
}

fn snapshot(user: &User, now: &str) -> ProjectMember {
    ProjectMember {
        user_id: user.id.clone(),
        user_name: user.name.clone(),
        role: user.role,
        assigned_at: now.to_string(),
    }
}
