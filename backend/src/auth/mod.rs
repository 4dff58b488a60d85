//! Bearer-token authentication.
//!
//! Tokens are issued elsewhere. This layer only verifies them, loads the
//! user once and attaches an [`IdentityContext`] to the request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::Repository;
use crate::errors::AppError;
use crate::identity::IdentityContext;
use crate::AppState;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry as a unix timestamp.
    pub exp: usize,
}

/// Verify a token and return its claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthorized("Invalid or expired token".to_string())
        })
}

/// Sign a token for `user_id` valid for `ttl_secs`. Used by tooling and tests.
pub fn issue_token(user_id: &str, secret: &str, ttl_secs: i64) -> Result<String, AppError> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: usize::try_from(exp).unwrap_or(0),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

fn bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Resolve the identity behind a verified user id.
pub async fn resolve_identity(repo: &Repository, user_id: &str) -> Result<IdentityContext, AppError> {
    let user = repo
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))?;
    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    if !user.role.is_platform() {
        let org_active = match user.organization_id.as_deref() {
            Some(org) => repo
                .get_organization(org)
                .await?
                .is_some_and(|o| o.is_active),
            None => false,
        };
        if !org_active {
            return Err(AppError::Forbidden(
                "Your organization has been deactivated".to_string(),
            ));
        }
    }

    Ok(user.identity())
}

/// Middleware attaching the caller's [`IdentityContext`] to the request.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer(&request).map(str::to_string) else {
        return AppError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    let identity = match verify_token(&token, &state.config.jwt_secret) {
        Ok(claims) => resolve_identity(&state.repo, &claims.sub).await,
        Err(e) => Err(e),
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
