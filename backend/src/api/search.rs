//! Search API endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Extension,
};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::identity::IdentityContext;
use crate::models::Ticket;
use crate::policy::{authorize, Action, ResourceKind};
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Search result with tickets and metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Single search result item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub ticket: Ticket,
    pub score: f32,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// Ranked hits considered before scope filtering.
const MAX_CANDIDATES: usize = 1000;

/// GET /api/search - Search tickets visible to the caller.
pub async fn search_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<IdentityContext>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    authorize(&identity, ResourceKind::Ticket, Action::Read)?;
    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);

    let predicate = state.tickets.predicate(&identity, None).await?;
    let hits = state.search.search(&params.q, MAX_CANDIDATES, 0)?;

    let ids: Vec<String> = hits.iter().map(|h| h.ticket_id.clone()).collect();
    let scores: HashMap<&str, f32> = hits
        .iter()
        .map(|h| (h.ticket_id.as_str(), h.score))
        .collect();

    // Rank order survives the scoped lookup.
    let visible = state.repo.tickets_by_ids(&ids, &predicate).await?;
    let total = visible.len();

    let results = visible
        .into_iter()
        .skip(params.offset)
        .take(limit)
        .map(|ticket| SearchResultItem {
            score: scores.get(ticket.id.as_str()).copied().unwrap_or_default(),
            ticket,
        })
        .collect();

    success(SearchResponse {
        results,
        total,
        limit,
        offset: params.offset,
    })
}
