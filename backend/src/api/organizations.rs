//! Organization API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{success, ApiResult, PageQuery};
use crate::identity::IdentityContext;
use crate::models::{
    CreateOrganizationRequest, CreateOrganizationWithAdminRequest, Organization,
    OrganizationStats, OrganizationWithAdmin, Page, UpdateOrganizationRequest,
};
use crate::AppState;

/// GET /api/organizations - List visible organizations.
pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Organization>> {
    success(
        state
            .organizations
            .list(&identity, query.page_params())
            .await?,
    )
}

/// GET /api/organizations/:id
pub async fn get_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<Organization> {
    success(state.organizations.get(&identity, &id).await?)
}

/// GET /api/organizations/:id/stats
pub async fn organization_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<OrganizationStats> {
    success(state.organizations.stats(&identity, &id).await?)
}

/// POST /api/organizations
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<CreateOrganizationRequest>,
) -> ApiResult<Organization> {
    success(state.organizations.create(&identity, &request).await?)
}

/// POST /api/organizations/with-admin - Create an organization and its first admin.
pub async fn create_organization_with_admin(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<CreateOrganizationWithAdminRequest>,
) -> ApiResult<OrganizationWithAdmin> {
    success(
        state
            .organizations
            .create_with_admin(&identity, &request)
            .await?,
    )
}

/// PUT /api/organizations/:id
pub async fn update_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> ApiResult<Organization> {
    success(state.organizations.update(&identity, &id, &request).await?)
}

/// DELETE /api/organizations/:id
pub async fn delete_organization(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.organizations.delete(&identity, &id).await?;
    success(())
}
