//! REST API module.
//!
//! Handlers are thin: they pull the [`IdentityContext`](crate::identity::IdentityContext)
//! out of the request, call one lifecycle service and wrap the result in the
//! success envelope.

mod activities;
mod comments;
mod notifications;
mod organizations;
mod projects;
mod search;
mod tickets;
mod users;

pub use activities::*;
pub use comments::*;
pub use notifications::*;
pub use organizations::*;
pub use projects::*;
pub use search::*;
pub use tickets::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::{page_params, PageParams};

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Plain `page`/`limit` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page_params(&self) -> PageParams {
        page_params(self.page, self.limit)
    }
}
