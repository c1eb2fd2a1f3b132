use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::extract::{ApiJson, ApiPath};
use super::validation::{PageQuery, validate_page};
use super::{ApiError, CreatePostRequest, MessageResponse};
use crate::db::StoreError;
use crate::models::post::{Post, PostPatch, PostSummary};
use crate::services::Identity;
use crate::state::BlogState;

/// GET /api/posts
pub async fn list_posts(
    State(state): State<Arc<BlogState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    let page = validate_page(query)?;
    let posts = state.posts.list(page.offset, page.limit).await?;

    Ok(Json(posts.into_iter().map(PostSummary::from).collect()))
}

/// GET /api/posts/{id}
pub async fn get_post(
    State(state): State<Arc<BlogState>>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .posts
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    Ok(Json(post))
}

/// POST /api/posts
pub async fn create_post(
    State(state): State<Arc<BlogState>>,
    Extension(identity): Extension<Identity>,
    ApiJson(payload): ApiJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state
        .posts
        .create(&payload.title, &payload.content, &identity.username)
        .await
        .map_err(|err| match err {
            // The author is the verified identity, not client input.
            StoreError::Validation(e) if e.field == "author" => {
                ApiError::InternalError(format!("Verified identity is not a valid author: {e}"))
            }
            other => other.into(),
        })?;

    tracing::info!(post_id = post.id, "Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// PATCH /api/posts/{id}
pub async fn update_post(
    State(state): State<Arc<BlogState>>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(patch): ApiJson<PostPatch>,
) -> Result<Response, ApiError> {
    owned_post(&state, id, &identity).await?;

    if patch.is_empty() {
        return Ok(Json(MessageResponse::new("No changes")).into_response());
    }

    let updated = state
        .posts
        .update(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    Ok(Json(updated).into_response())
}

/// DELETE /api/posts/{id}
pub async fn delete_post(
    State(state): State<Arc<BlogState>>,
    Extension(identity): Extension<Identity>,
    ApiPath(id): ApiPath<i32>,
) -> Result<StatusCode, ApiError> {
    owned_post(&state, id, &identity).await?;

    if !state.posts.delete(id).await? {
        return Err(ApiError::not_found("Post", id));
    }

    tracing::info!(post_id = id, "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// 404 when the post is gone, 403 when someone else wrote it.
async fn owned_post(state: &BlogState, id: i32, identity: &Identity) -> Result<Post, ApiError> {
    let post = state
        .posts
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", id))?;

    if post.author != identity.username {
        return Err(ApiError::forbidden("Not the author of this post"));
    }

    Ok(post)
}
