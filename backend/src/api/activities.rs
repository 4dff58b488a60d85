//! Activity feed endpoint.

use axum::{
    extract::{Query, State},
    Extension,
};

use super::{success, ApiResult};
use crate::identity::IdentityContext;
use crate::models::{ActivityFeed, ActivityQuery};
use crate::AppState;

/// GET /api/activities - `limit`/`offset` paginated, optionally narrowed by `userId`.
pub async fn activity_feed(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<ActivityFeed> {
    success(state.activities.feed(&identity, &query).await?)
}
