//! Local login accounts of the blog service.
//!
//! The blog can keep its accounts in process memory or in the `users`
//! table; both back the same [`AccountStore`] contract.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::ValidationError;
use crate::models::user::UserDraft;
use crate::services::password;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username already exists")]
    Duplicate,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Account storage failed: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::Duplicate`] if the username is taken.
    async fn register(&self, username: &str, password: &str) -> Result<(), AccountError>;

    /// `Ok(false)` for unknown users and wrong passwords alike.
    async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError>;

    async fn count(&self) -> Result<u64, AccountError>;
}

/// Accounts in a lock-protected map of username to argon2 hash.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, String>>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        let draft = UserDraft::new(username, None, password)?;

        if self.accounts.read().await.contains_key(draft.username()) {
            return Err(AccountError::Duplicate);
        }

        let hash = password::hash_password_blocking(draft.password).await?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&draft.username) {
            return Err(AccountError::Duplicate);
        }
        accounts.insert(draft.username, hash);
        Ok(())
    }

    async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        let Some(hash) = self.accounts.read().await.get(username).cloned() else {
            return Ok(false);
        };

        Ok(password::verify_password_blocking(password.to_string(), hash).await?)
    }

    async fn count(&self) -> Result<u64, AccountError> {
        Ok(self.accounts.read().await.len() as u64)
    }
}
