use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::extract::ApiJson;
use super::{ApiError, ApiResponse, CredentialsRequest, MessageResponse, TokenResponse, VerifiedUser};
use crate::services::auth_delegate::extract_bearer;
use crate::state::{BlogState, UserServiceState};

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok())
}

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the caller through the auth service and stores the
/// [`Identity`](crate::services::Identity) as a request extension.
pub async fn require_identity(
    State(state): State<Arc<BlogState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(authorization(request.headers()))?.to_string();
    let identity = state.verifier.verify(&token).await?;

    tracing::Span::current().record("user_id", identity.username.as_str());
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

// ============================================================================
// Blog accounts
// ============================================================================

/// POST /api/login
pub async fn blog_login(
    State(state): State<Arc<BlogState>>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let valid = state
        .accounts
        .verify(&payload.username, &payload.password)
        .await?;

    if !valid {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = state.tokens.issue(&payload.username)?;
    Ok(Json(TokenResponse { token }))
}

/// POST /api/register
pub async fn blog_register(
    State(state): State<Arc<BlogState>>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    state
        .accounts
        .register(&payload.username, &payload.password)
        .await?;

    tracing::info!(username = %payload.username, "New user registered");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Registration successful")),
    ))
}

// ============================================================================
// User service
// ============================================================================

/// POST /login
pub async fn user_login(
    State(state): State<Arc<UserServiceState>>,
    ApiJson(payload): ApiJson<CredentialsRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state
        .users
        .verify_credentials(&payload.username, &payload.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let token = state.tokens.issue(&user.username)?;
    Ok(Json(TokenResponse { token }))
}

/// GET /verify
///
/// The endpoint the blog service delegates to.
pub async fn verify_token(
    State(state): State<Arc<UserServiceState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<VerifiedUser>>, ApiError> {
    let token = extract_bearer(authorization(&headers))?;
    let claims = state.tokens.validate(token)?;

    Ok(Json(ApiResponse::success(VerifiedUser {
        username: claims.sub,
    })))
}
