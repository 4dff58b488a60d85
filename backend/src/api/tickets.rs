//! Ticket API endpoints.
//!
//! Every successful mutation is mirrored into the search index. Index
//! failures are logged and never fail the request.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use super::{success, ApiResult};
use crate::identity::IdentityContext;
use crate::models::{
    Activity, AssignTicketRequest, CreateTicketRequest, Page, Ticket, TicketListQuery,
    UpdateStatusRequest, UpdateTicketRequest,
};
use crate::AppState;

async fn reindex(state: &AppState, ticket: &Ticket) {
    if let Err(e) = state.search.index_ticket(ticket).await {
        tracing::warn!(ticket_id = %ticket.id, "Failed to index ticket: {}", e);
    }
}

/// GET /api/tickets - List tickets in scope, newest first.
pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<Page<Ticket>> {
    success(state.tickets.list(&identity, &query).await?)
}

/// GET /api/tickets/:id
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<Ticket> {
    success(state.tickets.get(&identity, &id).await?)
}

/// POST /api/tickets - Create a ticket, optionally pre-assigned.
pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<CreateTicketRequest>,
) -> ApiResult<Ticket> {
    let ticket = state.tickets.create(&identity, &request).await?;
    reindex(&state, &ticket).await;
    success(ticket)
}

/// PUT /api/tickets/:id - Update fields and optionally the assignee.
pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTicketRequest>,
) -> ApiResult<Ticket> {
    let ticket = state.tickets.update(&identity, &id, &request).await?;
    reindex(&state, &ticket).await;
    success(ticket)
}

/// PATCH /api/tickets/:id/assign
pub async fn assign_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<AssignTicketRequest>,
) -> ApiResult<Ticket> {
    let ticket = state.tickets.assign(&identity, &id, &request).await?;
    reindex(&state, &ticket).await;
    success(ticket)
}

/// PATCH /api/tickets/:id/status
pub async fn update_ticket_status(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Ticket> {
    let ticket = state.tickets.update_status(&identity, &id, &request).await?;
    reindex(&state, &ticket).await;
    success(ticket)
}

/// DELETE /api/tickets/:id
pub async fn delete_ticket(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.tickets.delete(&identity, &id).await?;
    if let Err(e) = state.search.remove_ticket(&id).await {
        tracing::warn!(ticket_id = %id, "Failed to remove ticket from index: {}", e);
    }
    success(())
}

/// GET /api/tickets/:id/activities - Audit history, newest first.
pub async fn ticket_history(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Activity>> {
    success(state.tickets.history(&identity, &id).await?)
}
