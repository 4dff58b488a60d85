//! Project API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{success, ApiResult};
use crate::identity::IdentityContext;
use crate::models::{
    AddMemberRequest, CreateProjectRequest, Page, Project, ProjectListQuery, UpdateProjectRequest,
};
use crate::AppState;

/// GET /api/projects - List projects with `status` and `search` filters.
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<Page<Project>> {
    success(state.projects.list(&identity, &query).await?)
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    success(state.projects.get(&identity, &id).await?)
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<Project> {
    success(state.projects.create(&identity, &request).await?)
}

/// PUT /api/projects/:id
pub async fn update_project(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Project> {
    success(state.projects.update(&identity, &id, &request).await?)
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.projects.delete(&identity, &id).await?;
    success(())
}

/// POST /api/projects/:id/members
pub async fn add_project_member(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> ApiResult<Project> {
    success(state.projects.add_member(&identity, &id, &request).await?)
}

/// DELETE /api/projects/:id/members/:user_id
pub async fn remove_project_member(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<Project> {
    success(
        state
            .projects
            .remove_member(&identity, &id, &user_id)
            .await?,
    )
}
