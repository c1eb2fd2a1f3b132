//! Liveness and statistics endpoints of both services.
//!
//! Statistics never fail: a database problem is reported as `"offline"`
//! without the underlying error text.

use axum::{Json, extract::State};
use std::sync::Arc;

use super::{BlogServiceStats, BlogStats, DatabaseStats, HealthResponse, UserServiceStats};
use crate::constants::services;
use crate::state::{BlogState, UserServiceState};

/// GET /health (blog)
pub async fn blog_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: services::BLOG,
    })
}

/// GET /stats (blog)
pub async fn blog_stats(State(state): State<Arc<BlogState>>) -> Json<BlogStats> {
    let blog_service = match state.posts.count().await {
        Ok(count) => BlogServiceStats {
            service_status: "online",
            post_count: Some(count),
        },
        Err(_) => BlogServiceStats {
            service_status: "offline",
            post_count: None,
        },
    };

    Json(BlogStats { blog_service })
}

/// GET /health (users)
pub async fn user_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: services::USERS,
    })
}

/// GET /stats (users)
pub async fn user_stats(State(state): State<Arc<UserServiceState>>) -> Json<UserServiceStats> {
    let user_count = if state.users.health_check().await {
        state.users.count().await.ok()
    } else {
        None
    };

    let healthy = user_count.is_some();
    Json(UserServiceStats {
        service: services::USERS,
        healthy,
        database: DatabaseStats {
            status: if healthy { "online" } else { "offline" },
            user_count,
        },
    })
}
