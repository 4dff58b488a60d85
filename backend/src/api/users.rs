//! User API endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{success, ApiResult, PageQuery};
use crate::identity::IdentityContext;
use crate::models::{
    Activity, CreateUserRequest, NotificationPreferences, Page, UpdatePreferencesRequest,
    UpdateUserRequest, User, UserListQuery,
};
use crate::AppState;

/// GET /api/users - List users with `role`, `isActive` and `search` filters.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Page<User>> {
    success(state.users.list(&identity, &query).await?)
}

/// GET /api/users/me
pub async fn current_user(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
) -> ApiResult<User> {
    success(state.users.me(&identity).await?)
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    success(state.users.get(&identity, &id).await?)
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    success(state.users.create(&identity, &request).await?)
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    success(state.users.update(&identity, &id, &request).await?)
}

/// PATCH /api/users/:id/toggle-status
pub async fn toggle_user_status(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    success(state.users.toggle_status(&identity, &id).await?)
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.users.delete(&identity, &id).await?;
    success(())
}

/// GET /api/users/:id/preferences
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<NotificationPreferences> {
    success(state.users.preferences(&identity, &id).await?)
}

/// PUT /api/users/:id/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePreferencesRequest>,
) -> ApiResult<NotificationPreferences> {
    success(
        state
            .users
            .update_preferences(&identity, &id, &request)
            .await?,
    )
}

/// GET /api/users/:id/activities - What a user did or was targeted by.
pub async fn user_activities(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page<Activity>> {
    success(
        state
            .users
            .activities(&identity, &id, query.page_params())
            .await?,
    )
}
