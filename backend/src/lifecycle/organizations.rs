//! Organization lifecycle.

use crate::db::Repository;
use crate::errors::AppError;
use crate::events::now;
use crate::identity::{IdentityContext, RoleVariant};
use crate::models::{
    normalize_email, CreateOrganizationRequest, CreateOrganizationWithAdminRequest,
    NotificationPreferences, Organization, OrganizationStats, OrganizationWithAdmin, Page,
    PageParams, UpdateOrganizationRequest, User,
};
use crate::policy::{authorize, resolve_scope, Action, Predicate, ResourceKind, TicketScopeMode};
use crate::saga::Saga;

use super::required;

#[derive(Clone)]
pub struct OrganizationService {
    repo: Repository,
    role_variant: RoleVariant,
}

impl OrganizationService {
    pub fn new(repo: Repository, role_variant: RoleVariant) -> Self {
        Self { repo, role_variant }
    }

    pub async fn list(
        &self,
        identity: &IdentityContext,
        params: PageParams,
    ) -> Result<Page<Organization>, AppError> {
        authorize(identity, ResourceKind::Organization, Action::Read)?;
        let scope = resolve_scope(
            identity,
            ResourceKind::Organization,
            None,
            TicketScopeMode::Organization,
        );
        self.repo
            .list_organizations(&Predicate::for_owned(&scope), params)
            .await
    }

    pub async fn get(&self, identity: &IdentityContext, id: &str) -> Result<Organization, AppError> {
        authorize(identity, ResourceKind::Organization, Action::Read)?;
        let not_found = || AppError::NotFound(format!("Organization {} not found", id));

        let org = self.repo.get_organization(id).await?.ok_or_else(not_found)?;
        let scope = resolve_scope(
            identity,
            ResourceKind::Organization,
            None,
            TicketScopeMode::Organization,
        );
        if !scope.admits_organization(&org.id) {
            return Err(not_found());
        }
        Ok(org)
    }

    pub async fn stats(
        &self,
        identity: &IdentityContext,
        id: &str,
    ) -> Result<OrganizationStats, AppError> {
        let org = self.get(identity, id).await?;
        self.repo.organization_stats(&org.id).await
    }

    pub async fn create(
        &self,
        identity: &IdentityContext,
        request: &CreateOrganizationRequest,
    ) -> Result<Organization, AppError> {
        authorize(identity, ResourceKind::Organization, Action::Create)?;
        let org = new_organization(identity, &request.name, request.description.as_deref())?;
        self.repo.insert_organization(&org).await?;
        tracing::info!(organization_id = %org.id, "Organization created");
        Ok(org)
    }

    /// Create an organization together with its first management account.
    ///
    /// The two inserts run as a saga: if the admin cannot be created (for
    /// example because the email is taken) the organization is deleted again
    /// before the error is returned.
    pub async fn create_with_admin(
        &self,
        identity: &IdentityContext,
        request: &CreateOrganizationWithAdminRequest,
    ) -> Result<OrganizationWithAdmin, AppError> {
        authorize(identity, ResourceKind::Organization, Action::Create)?;
        authorize(identity, ResourceKind::User, Action::Create)?;

        let org = new_organization(identity, &request.name, request.description.as_deref())?;
        let admin_name = required(&request.admin_user.name, "Admin name")?;
        let admin_email = normalize_email(&request.admin_user.email);
        if !admin_email.contains('@') {
            return Err(AppError::Validation("A valid admin email is required".to_string()));
        }

        let mut saga = Saga::new("create_organization_with_admin");

        let organization = saga
            .step(
                "insert_organization",
                async {
                    self.repo.insert_organization(&org).await?;
                    Ok::<_, AppError>(org.clone())
                },
                |created: &Organization| {
                    let repo = self.repo.clone();
                    let id = created.id.clone();
                    async move { repo.delete_organization(&id).await.map(|_| ()) }
                },
            )
            .await?;

        let now = now();
        let admin = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: admin_name,
            email: admin_email,
            role: self.role_variant.management_role(),
            organization_id: Some(organization.id.clone()),
            is_active: true,
            created_by: Some(identity.user_id.clone()),
            notification_preferences: NotificationPreferences::default(),
            created_at: now.clone(),
            updated_at: now,
        };

        let admin_user = saga
            .step(
                "insert_admin_user",
                async {
                    self.repo.insert_user(&admin).await?;
                    Ok::<_, AppError>(admin.clone())
                },
                |created: &User| {
                    let repo = self.repo.clone();
                    let id = created.id.clone();
                    async move { repo.delete_user(&id).await.map(|_| ()) }
                },
            )
            .await?;

        saga.commit();
        tracing::info!(
            organization_id = %organization.id,
            admin_id = %admin_user.id,
            "Organization created with admin"
        );

        Ok(OrganizationWithAdmin {
            organization,
            admin_user,
        })
    }

    pub async fn update(
        &self,
        identity: &IdentityContext,
        id: &str,
        request: &UpdateOrganizationRequest,
    ) -> Result<Organization, AppError> {
        authorize(identity, ResourceKind::Organization, Action::Update)?;
        let mut org = self
            .repo
            .get_organization(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))?;

        if let Some(name) = &request.name {
            org.name = required(name, "Name")?;
        }
        if let Some(description) = &request.description {
            org.description = Some(description.clone());
        }
        if let Some(active) = request.is_active {
            if active != org.is_active {
                tracing::info!(organization_id = %org.id, active, "Organization activation changed");
            }
            org.is_active = active;
        }
        org.updated_at = now();

        self.repo.update_organization(&org).await?;
        Ok(org)
    }

    /// Delete an organization no user references any more.
    pub async fn delete(&self, identity: &IdentityContext, id: &str) -> Result<(), AppError> {
        authorize(identity, ResourceKind::Organization, Action::Delete)?;
        if self.repo.get_organization(id).await?.is_none() {
            return Err(AppError::NotFound(format!("Organization {} not found", id)));
        }

        let users = self.repo.count_users_in_organization(id).await?;
        if users > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot delete organization with {} user(s). Remove or reassign them first.",
                users
            )));
        }

        self.repo.delete_organization(id).await?;
        tracing::info!(organization_id = %id, "Organization deleted");
        Ok(())
    }
}

fn new_organization(
    identity: &IdentityContext,
    name: &str,
    description: Option<&str>,
) -> Result<Organization, AppError> {
    let now = now();
    Ok(Organization {
        id: uuid::Uuid::new_v4().to_string(),
        name: required(name, "Name")?,
        description: description.map(str::to_string),
        is_active: true,
        created_by: identity.user_id.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}
