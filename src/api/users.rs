use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
};
use std::sync::Arc;

use super::extract::ApiJson;
use super::validation::{PageQuery, validate_page};
use super::{ApiError, CreateUserRequest, UserDto};
use crate::state::UserServiceState;

/// POST /users
pub async fn create_user(
    State(state): State<Arc<UserServiceState>>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let user = state
        .users
        .add_user(&payload.username, payload.email.as_deref(), &payload.password)
        .await?
        .ok_or_else(|| ApiError::Conflict("User already exists".to_string()))?;

    tracing::info!(user_id = user.id, username = %user.username, "User created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users
pub async fn list_users(
    State(state): State<Arc<UserServiceState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let page = validate_page(query)?;
    let users = state.users.list(page.offset, page.limit).await?;

    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}
