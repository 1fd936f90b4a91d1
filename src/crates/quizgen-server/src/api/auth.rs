//! Bearer-token authentication extractor

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use crate::api::{error::ApiError, routes::AppState};

/// Authenticated caller
///
/// Handlers that take this extractor reject requests without a valid token.
/// The raw token is kept so it can be forwarded to the worker.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (claims, token) = state
            .verifier
            .verify_headers(&parts.headers)
            .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

        Ok(AuthUser {
            user_id: claims.sub,
            token: token.to_string(),
        })
    }
}
