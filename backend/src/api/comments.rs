//! Ticket comment endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{success, ApiResult};
use crate::identity::IdentityContext;
use crate::models::{Comment, CreateCommentRequest};
use crate::AppState;

/// GET /api/tickets/:id/comments - Oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(ticket_id): Path<String>,
) -> ApiResult<Vec<Comment>> {
    success(state.tickets.comments(&identity, &ticket_id).await?)
}

/// POST /api/tickets/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(ticket_id): Path<String>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<Comment> {
    success(
        state
            .tickets
            .add_comment(&identity, &ticket_id, &request)
            .await?,
    )
}

/// DELETE /api/tickets/:id/comments/:comment_id
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path((ticket_id, comment_id)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .tickets
        .delete_comment(&identity, &ticket_id, &comment_id)
        .await?;
    success(())
}
