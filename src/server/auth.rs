use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{RequireSession, SESSION_COOKIE, SESSION_TTL_SECONDS};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, SessionResponse, SignupRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::types::User;

/// Issued alongside the JSON body so browser clients work without
/// touching the Authorization header.
fn session_cookie(token: &str) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={SESSION_TTL_SECONDS}"
    )
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    if let Ok(value) = cookie.parse() {
        response.headers_mut().insert(SET_COOKIE, value);
    }
    response
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let company_name = req.company.trim();
    let username = req.username.trim();
    if company_name.is_empty() || username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request(
            "Company, username and password are required",
        ));
    }

    let store = state.store.as_ref();
    let company = store.get_or_create_company(company_name)?;

    if store
        .get_user_by_username(&company.id, username)?
        .is_some()
    {
        return Err(ApiError::bad_request("Username already exists"));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        company_id: company.id,
        username: username.to_string(),
        password_hash: state.passwords.hash(&req.password)?,
        created_by: None,
        created_at: Utc::now(),
    };
    store.create_user(&user)?;

    let token = state.sessions.issue(&user)?;
    let body = SessionResponse {
        token: token.clone(),
        user,
        company: company_name.to_string(),
    };

    let response = (StatusCode::CREATED, Json(ApiResponse::success(body))).into_response();
    Ok(with_cookie(response, &session_cookie(&token)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let store = state.store.as_ref();

    // Unknown user and bad password share a message; an unknown company
    // is a plain 404.
    let invalid = || ApiError::unauthorized("Invalid credentials");

    let company = store
        .get_company_by_name(req.company.trim())?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;
    let user = store
        .get_user_by_username(&company.id, req.username.trim())?
        .ok_or_else(invalid)?;

    if !state.passwords.verify(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = state.sessions.issue(&user)?;
    let body = SessionResponse {
        token: token.clone(),
        user,
        company: company.name,
    };

    let response = Json(ApiResponse::success(body)).into_response();
    Ok(with_cookie(response, &session_cookie(&token)))
}

pub async fn logout() -> Response {
    let response = Json(ApiResponse::success(serde_json::json!({
        "logged_out": true
    })))
    .into_response();
    with_cookie(response, &clear_session_cookie())
}

pub async fn verify(auth: RequireSession) -> impl IntoResponse {
    Json(ApiResponse::success(auth.0.user))
}
