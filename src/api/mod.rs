use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::{BlogState, UserServiceState};

mod auth;
mod error;
mod extract;
mod observability;
mod posts;
mod system;
mod types;
mod users;
mod validation;

pub use error::ApiError;
pub use types::*;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };
    layer.allow_methods(Any).allow_headers(Any)
}

pub fn blog_router(state: Arc<BlogState>) -> Router {
    let protected = Router::new()
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            axum::routing::patch(posts::update_post).delete(posts::delete_post),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    let api = Router::new()
        .merge(protected)
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route("/login", post(auth::blog_login))
        .route("/register", post(auth::blog_register));

    Router::new()
        .nest("/api", api)
        .route("/health", get(system::blog_health))
        .route("/stats", get(system::blog_stats))
        .merge(observability::metrics_routes(state.prometheus_handle.clone()))
        .layer(cors_layer(&state.cors_allowed_origins))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

pub fn users_router(state: Arc<UserServiceState>) -> Router {
    Router::new()
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/login", post(auth::user_login))
        .route("/verify", get(auth::verify_token))
        .route("/health", get(system::user_health))
        .route("/stats", get(system::user_stats))
        .merge(observability::metrics_routes(state.prometheus_handle.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}
