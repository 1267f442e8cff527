use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use log::{trace, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::ProxyError;

/// Admin resolved from a `Bearer` session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedAdmin {
    pub admin_id: Uuid,
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: Option<&str>) -> Result<&str, ProxyError> {
    let header = header.ok_or_else(|| ProxyError::Unauthorized("Missing authorization".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ProxyError::Unauthorized("Invalid authorization format".into()))?
        .trim();
    if token.is_empty() {
        return Err(ProxyError::Unauthorized("Invalid authorization token".into()));
    }
    Ok(token)
}

impl FromRequestParts<AppState> for AuthenticatedAdmin {
    type Rejection = ProxyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                ProxyError::Unauthorized("Invalid authorization header".into())
            })?),
            None => None,
        };
        let token = bearer_token(header)?;

        match state.admin.authenticate(token).await {
            Some(admin_id) => {
                trace!("Authenticated admin: {}", admin_id);
                Ok(AuthenticatedAdmin { admin_id })
            }
            None => {
                warn!("Rejected unknown or expired session token");
                Err(ProxyError::Unauthorized("Invalid authorization token".into()))
            }
        }
    }
}
