use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use inkpost::config::DatabaseConfig;
use inkpost::db::{RetryPolicy, Store, Table};
use inkpost::services::{
    Identity, IdentityVerifier, InMemoryAccountStore, TokenService, VerifyError,
};
use inkpost::state::BlogState;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Resolves `token-<name>` to `<name>`; `down` simulates an unreachable auth service.
struct StubVerifier;

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        if token == "down" {
            return Err(VerifyError::Unreachable("connection refused".to_string()));
        }
        token
            .strip_prefix("token-")
            .map(|name| Identity {
                username: name.to_string(),
            })
            .ok_or_else(|| VerifyError::Rejected("unknown token".to_string()))
    }
}

async fn spawn_app() -> Router {
    let store = Store::connect(&DatabaseConfig::in_memory())
        .await
        .expect("Failed to create store");
    store
        .ensure_schema(
            &[Table::Posts, Table::Users],
            RetryPolicy::new(1, Duration::from_millis(1)),
        )
        .await
        .expect("Failed to create schema");

    let state = BlogState::with_components(
        store.posts(),
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(StubVerifier),
        TokenService::new("test-secret", 30),
    );
    inkpost::api::blog_router(Arc::new(state))
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn create_post(app: &Router, token: &str, title: &str, content: &str) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/posts",
            Some(token),
            Some(json!({ "title": title, "content": content })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn test_create_requires_identity() {
    let app = spawn_app().await;
    let payload = json!({ "title": "t", "content": "c" });

    let (status, body) = send(&app, request("POST", "/api/posts", None, Some(payload.clone()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        request("POST", "/api/posts", Some("forged"), Some(payload.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        send(&app, request("POST", "/api/posts", Some("down"), Some(payload))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");

    let (status, body) = send(&app, request("GET", "/api/posts", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_post_lifecycle() {
    let app = spawn_app().await;

    let created = create_post(&app, "token-admin", "Hello", "First post").await;
    assert_eq!(created["author"], "admin");
    assert_eq!(created["created_at"], created["updated_at"]);
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&app, request("GET", &format!("/api/posts/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/posts/{id}"),
            Some("token-admin"),
            Some(json!({ "title": "Hello again" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Hello again");
    assert_eq!(updated["content"], "First post");
    assert_ne!(updated["updated_at"], created["updated_at"]);

    let (status, body) = send(
        &app,
        request("DELETE", &format!("/api/posts/{id}"), Some("token-admin"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, body) = send(&app, request("GET", &format!("/api/posts/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/posts/{id}"), Some("token-admin"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_the_author_may_modify() {
    let app = spawn_app().await;
    let created = create_post(&app, "token-admin", "Mine", "Body").await;
    let uri = format!("/api/posts/{}", created["id"]);

    let (status, body) = send(
        &app,
        request("PATCH", &uri, Some("token-dev"), Some(json!({ "title": "Yours" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = send(&app, request("DELETE", &uri, Some("token-dev"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, unchanged) = send(&app, request("GET", &uri, None, None)).await;
    assert_eq!(unchanged["title"], "Mine");
}

#[tokio::test]
async fn test_empty_patch_reports_no_changes() {
    let app = spawn_app().await;
    let created = create_post(&app, "token-admin", "Stable", "Body").await;
    let uri = format!("/api/posts/{}", created["id"]);

    let (status, body) = send(&app, request("PATCH", &uri, Some("token-admin"), Some(json!({})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "No changes" }));

    let (_, after) = send(&app, request("GET", &uri, None, None)).await;
    assert_eq!(after, created);
}

#[tokio::test]
async fn test_patch_missing_post_is_404() {
    let app = spawn_app().await;
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            "/api/posts/999",
            Some("token-admin"),
            Some(json!({ "title": "x" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_fields_are_400() {
    let app = spawn_app().await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/posts",
            Some("token-admin"),
            Some(json!({ "title": "t".repeat(121), "content": "c" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().starts_with("title"));

    let (status, _) = send(&app, request("GET", "/api/posts?limit=0", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, request("GET", "/api/posts?offset=-1", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_is_newest_first_with_excerpts() {
    let app = spawn_app().await;
    let long = format!("{}\nmore", "a".repeat(130));
    let p1 = create_post(&app, "token-admin", "P1", "one").await;
    let p2 = create_post(&app, "token-admin", "P2", &long).await;
    let p3 = create_post(&app, "token-admin", "P3", "line\r\nbreak").await;

    let (status, page) = send(&app, request("GET", "/api/posts?offset=0&limit=2", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&Value> = page.as_array().unwrap().iter().map(|p| &p["id"]).collect();
    assert_eq!(ids, vec![&p3["id"], &p2["id"]]);

    assert_eq!(page[0]["excerpt"], "line  break");
    assert!(page[0].get("content").is_none());
    let excerpt = page[1]["excerpt"].as_str().unwrap();
    assert_eq!(excerpt, format!("{}...", "a".repeat(120)));

    let (_, rest) = send(&app, request("GET", "/api/posts?offset=2&limit=2", None, None)).await;
    assert_eq!(rest.as_array().unwrap().len(), 1);
    assert_eq!(rest[0]["id"], p1["id"]);
}

#[tokio::test]
async fn test_register_and_login() {
    let app = spawn_app().await;
    let creds = json!({ "username": "writer", "password": "pw" });

    let (status, body) = send(&app, request("POST", "/api/register", None, Some(creds.clone()))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Registration successful");

    let (status, body) = send(&app, request("POST", "/api/register", None, Some(creds.clone()))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = send(
        &app,
        request("POST", "/api/register", None, Some(json!({ "username": "", "password": "pw" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, request("POST", "/api/login", None, Some(creds))).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();
    let claims = TokenService::new("test-secret", 30).validate(token).unwrap();
    assert_eq!(claims.sub, "writer");

    let (status, _) = send(
        &app,
        request("POST", "/api/login", None, Some(json!({ "username": "writer", "password": "no" }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_stats() {
    let app = spawn_app().await;
    create_post(&app, "token-admin", "Counted", "Body").await;

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "service": "blog-service" }));

    let (status, body) = send(&app, request("GET", "/stats", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "blog_service": { "service_status": "online", "post_count": 1 } })
    );
}

fn raw_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn assert_validation_error(app: &Router, req: Request<Body>) -> String {
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let message = body["error"].as_str().unwrap().to_string();
    assert!(!message.contains("deserialize"), "{message}");
    assert!(!message.contains("i32"), "{message}");
    message
}

#[tokio::test]
async fn test_malformed_input_uses_error_envelope() {
    let app = spawn_app().await;

    let message = assert_validation_error(
        &app,
        raw_request("POST", "/api/posts", Some("token-admin"), r#"{"title":5}"#),
    )
    .await;
    assert_eq!(message, "Request body does not match the expected fields");

    let message = assert_validation_error(
        &app,
        raw_request("POST", "/api/posts", Some("token-admin"), "not json"),
    )
    .await;
    assert_eq!(message, "Request body is not valid JSON");

    let message = assert_validation_error(&app, request("GET", "/api/posts/abc", None, None)).await;
    assert_eq!(message, "Invalid path parameter");

    assert_validation_error(
        &app,
        raw_request("PATCH", "/api/posts/abc", Some("token-admin"), r#"{"title":"x"}"#),
    )
    .await;
    assert_validation_error(&app, raw_request("POST", "/api/login", None, "{")).await;
    assert_validation_error(&app, request("GET", "/api/posts?limit=ten", None, None)).await;

    let (_, posts) = send(&app, request("GET", "/api/posts", None, None)).await;
    assert_eq!(posts, json!([]));
}

#[tokio::test]
async fn test_oversized_identity_is_a_server_error() {
    let app = spawn_app().await;
    let token = format!("token-{}", "a".repeat(101));

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/posts",
            Some(&token),
            Some(json!({ "title": "t", "content": "c" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"], "An internal error occurred");

    let (_, posts) = send(&app, request("GET", "/api/posts", None, None)).await;
    assert_eq!(posts, json!([]));
}
