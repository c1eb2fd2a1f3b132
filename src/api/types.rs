use serde::{Deserialize, Serialize};

/// Envelope for `/verify` answers and every error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn error(message: impl Into<String>, code: &str) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(message.into()),
            code: Some(code.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
}

impl From<crate::models::user::User> for UserDto {
    fn from(user: crate::models::user::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifiedUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BlogStats {
    pub blog_service: BlogServiceStats,
}

#[derive(Debug, Serialize)]
pub struct BlogServiceStats {
    pub service_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_count: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct UserServiceStats {
    pub service: &'static str,
    pub healthy: bool,
    pub database: DatabaseStats,
}

#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_count: Option<u64>,
}
