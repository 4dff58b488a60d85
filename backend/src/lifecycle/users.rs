//! User lifecycle and notification preferences.

use crate::db::Repository;
use crate::errors::AppError;
use crate::events::now;
use crate::identity::{IdentityContext, Role, RoleVariant};
use crate::models::{
    normalize_email, Activity, CreateUserRequest, NotificationPreferences, Page, PageParams,
    UpdatePreferencesRequest, UpdateUserRequest, User, UserListQuery,
};
use crate::policy::{
    authorize, resolve_scope, Access, Action, Predicate, ResourceKind, Scope, TicketScopeMode,
};

use super::required;

#[derive(Clone)]
pub struct UserService {
    repo: Repository,
    role_variant: RoleVariant,
}

impl UserService {
    pub fn new(repo: Repository, role_variant: RoleVariant) -> Self {
        Self { repo, role_variant }
    }

    fn scope(&self, identity: &IdentityContext, organization_filter: Option<&str>) -> Scope {
        resolve_scope(
            identity,
            ResourceKind::User,
            organization_filter,
            TicketScopeMode::Organization,
        )
    }

    /// Create the platform account named by the bootstrap settings if no user
    /// with that email exists yet.
    pub async fn ensure_superadmin(&self, email: &str, name: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        if let Some(existing) = self.repo.get_user_by_email(&email).await? {
            if existing.role != Role::Superadmin {
                tracing::warn!(%email, role = %existing.role, "Bootstrap email belongs to a non-platform user");
            }
            return Ok(existing);
        }

        let now = now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: required(name, "Name")?,
            email,
            role: Role::Superadmin,
            organization_id: None,
            is_active: true,
            created_by: None,
            notification_preferences: NotificationPreferences::default(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.repo.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap superadmin created");
        Ok(user)
    }

    pub async fn list(
        &self,
        identity: &IdentityContext,
        query: &UserListQuery,
    ) -> Result<Page<User>, AppError> {
        authorize(identity, ResourceKind::User, Action::Read)?;
        let scope = self.scope(identity, query.organization_id.as_deref());
        self.repo.list_users(&Predicate::for_owned(&scope), query).await
    }

    pub async fn get(&self, identity: &IdentityContext, id: &str) -> Result<User, AppError> {
        authorize(identity, ResourceKind::User, Action::Read)?;
        self.load_visible(identity, id).await
    }

    /// The actor's own record.
    pub async fn me(&self, identity: &IdentityContext) -> Result<User, AppError> {
        self.repo
            .get_user(&identity.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn create(
        &self,
        identity: &IdentityContext,
        request: &CreateUserRequest,
    ) -> Result<User, AppError> {
        authorize(identity, ResourceKind::User, Action::Create)?;

        let name = required(&request.name, "Name")?;
        let email = normalize_email(&request.email);
        if !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        self.check_role(identity, request.role)?;

        let organization_id = if request.role.is_platform() {
            None
        } else if identity.is_platform() {
            let org = request.organization_id.as_deref().ok_or_else(|| {
                AppError::Validation(format!("Role {} requires an organization", request.role))
            })?;
            self.require_organization(org).await?;
            Some(org.to_string())
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
                    "Users can only be created in your own organization".to_string(),
                ));
            }
            Some(own)
        };

        let now = now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            role: request.role,
            organization_id,
            is_active: true,
            created_by: Some(identity.user_id.clone()),
            notification_preferences: NotificationPreferences::default(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.repo.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "User created");
        Ok(user)
    }

    /// Update a user. Anyone may rename themselves; every other change needs
    /// the user-update permission over the target.
    pub async fn update(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        let self_rename = id == identity.user_id
            && request.role.is_none()
            && request.is_active.is_none()
            && request.organization_id.is_none();

        let mut user = if self_rename {
            self.me(identity).await?
        } else {
            authorize(identity, ResourceKind::User, Action::Update)?;
            self.load_for_write(identity, id).await?
        };
        let previous_organization = user.organization_id.clone();
        let was_assignable = user.role.is_assignable();

        if let Some(name) = &request.name {
            user.name = required(name, "Name")?;
        }
        if let Some(role) = request.role {
            self.check_role(identity, role)?;
            user.role = role;
        }
        if let Some(org) = &request.organization_id {
            if !identity.is_platform() && user.organization_id.as_deref() != Some(org.as_str()) {
                return Err(AppError::Forbidden(
                    "Only platform administrators can move users between organizations"
                        .to_string(),
                ));
            }
            self.require_organization(org).await?;
            user.organization_id = Some(org.clone());
        }
        if let Some(active) = request.is_active {
            if !active && user.id == identity.user_id {
                return Err(AppError::Validation(
                    "You cannot deactivate your own account".to_string(),
                ));
            }
            user.is_active = active;
        }

        // Organization required unless the role is the platform role.
        if user.role.is_platform() {
            user.organization_id = None;
        } else if user.organization_id.is_none() {
            return Err(AppError::Validation(format!(
                "Role {} requires an organization",
                user.role
            )));
        }

        let moved = user.organization_id != previous_organization;
        let demoted = was_assignable && !user.role.is_assignable();
        if moved || demoted {
            self.ensure_released(&user, moved).await?;
        }

        user.updated_at = now();
        self.repo.update_user(&user).await?;
        Ok(user)
    }

    pub async fn toggle_status(&self, identity: &IdentityContext, id: &str) -> Result<User, AppError> {
        authorize(identity, ResourceKind::User, Action::Update)?;
        if id == identity.user_id {
            return Err(AppError::Validation(
                "You cannot deactivate your own account".to_string(),
            ));
        }

        let mut user = self.load_for_write(identity, id).await?;
        user.is_active = !user.is_active;
        user.updated_at = now();
        self.repo.update_user(&user).await?;
        tracing::info!(user_id = %user.id, active = user.is_active, "User status toggled");
        Ok(user)
    }

    pub async fn delete(&self, identity: &IdentityContext, id: &str) -> Result<(), AppError> {
        authorize(identity, ResourceKind::User, Action::Delete)?;
        if id == identity.user_id {
            return Err(AppError::Validation(
                "You cannot delete your own account".to_string(),
            ));
        }

        self.load_for_write(identity, id).await?;
        self.repo.delete_user(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn preferences(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> Result<NotificationPreferences, AppError> {
        let user = if id == identity.user_id {
            self.me(identity).await?
        } else {
            self.get(identity, id).await?
        };
        Ok(user.notification_preferences)
    }

    pub async fn update_preferences(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdatePreferencesRequest,
    ) -> Result<NotificationPreferences, AppError> {
        let mut user = if id == identity.user_id {
            self.me(identity).await?
        } else {
            authorize(identity, ResourceKind::User, Action::Update)?;
            self.load_for_write(identity, id).await?
        };

        user.notification_preferences = user.notification_preferences.apply(request);
        user.updated_at = now();
        self.repo.update_user(&user).await?;
        Ok(user.notification_preferences)
    }

    /// Activities a visible user performed or was targeted by.
    pub async fn activities(
        &self,
        identity: &IdentityContext,
        id: &str,
        params: PageParams,
    ) -> Result<Page<Activity>, AppError> {
        let access = authorize(identity, ResourceKind::Activity, Action::Read)?;
        if access == Access::Involved && id != identity.user_id {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        self.load_visible(identity, id).await?;
        self.repo.activities_for_user(id, params).await
    }

    // ==================== CHECKS ====================

    /// A user leaving their organization must first be off every project
    /// team and hold no tickets; one losing an assignable role must hold no
    /// tickets.
    async fn ensure_released(&self, user: &User, moved: bool) -> Result<(), AppError> {
        let (rosters, tickets) = self.repo.user_commitments(&user.id).await?;
        if moved && rosters > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot move user while they are on {} project team(s). Remove them first.",
                rosters
            )));
        }
        if tickets > 0 {
            return Err(AppError::Conflict(format!(
                "User still holds {} assigned ticket(s). Reassign them first.",
                tickets
            )));
        }
        Ok(())
    }

    fn check_role(&self, identity: &IdentityContext, role: Role) -> Result<(), AppError> {
        if !self.role_variant.supports(role) {
            return Err(AppError::Validation(format!(
                "Role {} is not available in this deployment",
                role
            )));
        }
        if role.is_platform() && !identity.is_platform() {
            return Err(AppError::Forbidden(
                "Only platform administrators can grant the platform role".to_string(),
            ));
        }
        Ok(())
    }

    async fn require_organization(&self, id: &str) -> Result<(), AppError> {
        if self.repo.get_organization(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Organization {} not found", id)));
        }
        Ok(())
    }

    async fn load_visible(&self, identity: &IdentityContext, id: &str) -> Result<User, AppError> {
        let not_found = || AppError::NotFound(format!("User {} not found", id));
        let user = self.repo.get_user(id).await?.ok_or_else(not_found)?;
        if !self.scope(identity, None).admits_user(&user) {
            return Err(not_found());
        }
        Ok(user)
    }

    async fn load_for_write(&self, identity: &IdentityContext, id: &str) -> Result<User, AppError> {
        let user = self
            .repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        if !self.scope(identity, None).admits_user(&user) {
            return Err(AppError::Forbidden(
                "User belongs to another organization".to_string(),
            ));
        }
        Ok(user)
    }
}
