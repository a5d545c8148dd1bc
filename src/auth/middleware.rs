use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{
        StatusCode,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use serde_json::json;

use super::session::SESSION_COOKIE;
use crate::server::AppState;
use crate::types::User;

/// The authenticated caller. Every tenant-scoped handler receives one of
/// these; tenant isolation hangs off `company_id`.
pub struct AuthContext {
    pub user: User,
    pub company_id: String,
}

/// Extractor that requires a valid session token, from the Authorization
/// header or the session cookie.
pub struct RequireSession(pub AuthContext);

#[derive(Debug)]
pub enum AuthError {
    MissingSession,
    InvalidScheme,
    InvalidSession,
    SessionExpired,
    UnknownUser,
    TenantMismatch,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidSession => (StatusCode::UNAUTHORIZED, "Invalid session token"),
            AuthError::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired"),
            AuthError::UnknownUser => (StatusCode::UNAUTHORIZED, "Unknown user"),
            AuthError::TenantMismatch => (
                StatusCode::FORBIDDEN,
                "Session does not match the user's tenant",
            ),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"fortress\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(parts)?.ok_or(AuthError::MissingSession)?;

        let claims = state.sessions.verify(&token).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::SessionExpired,
            _ => AuthError::InvalidSession,
        })?;

        let user = state
            .store
            .get_user(&claims.sub)
            .map_err(|_| AuthError::InternalError)?
            .ok_or(AuthError::UnknownUser)?;

        // A stale token minted before the user moved tenants must not
        // grant access under the old company.
        if user.company_id != claims.company_id {
            return Err(AuthError::TenantMismatch);
        }

        let company_id = user.company_id.clone();
        Ok(RequireSession(AuthContext { user, company_id }))
    }
}

fn extract_session_token(parts: &Parts) -> Result<Option<String>, AuthError> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let value = header.to_str().map_err(|_| AuthError::InvalidScheme)?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?;
        return Ok(Some(token.trim().to_string()));
    }

    Ok(session_cookie(parts))
}

/// Pulls the session cookie out of the Cookie header, if present.
fn session_cookie(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        if let Some(value) = pair.trim().strip_prefix(SESSION_COOKIE) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}
