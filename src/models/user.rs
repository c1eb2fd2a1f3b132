use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ValidationError, check_length};
use crate::constants::limits::{EMAIL_MAX_CHARS, PASSWORD_MAX_CHARS, USERNAME_MAX_CHARS};
use crate::entities::users;

/// User data returned from the repository (without the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            created_at: model.created_at,
        }
    }
}

/// Validated registration input. The password is only held until it is hashed.
pub struct UserDraft {
    pub(crate) username: String,
    pub(crate) email: Option<String>,
    pub(crate) password: String,
}

impl UserDraft {
    pub fn new(
        username: impl Into<String>,
        email: Option<String>,
        password: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let draft = Self {
            username: username.into(),
            email,
            password: password.into(),
        };

        check_length("username", &draft.username, USERNAME_MAX_CHARS)?;
        if draft.username.chars().any(char::is_whitespace) {
            return Err(ValidationError::new(
                "username",
                "must not contain whitespace",
            ));
        }
        if let Some(email) = &draft.email {
            check_length("email", email, EMAIL_MAX_CHARS)?;
            if !email.contains('@') {
                return Err(ValidationError::new("email", "must be an email address"));
            }
        }
        check_length("password", &draft.password, PASSWORD_MAX_CHARS)?;

        Ok(draft)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl std::fmt::Debug for UserDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDraft")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
