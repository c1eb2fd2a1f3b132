//! `SeaORM` implementation of the `AccountStore` trait.

use async_trait::async_trait;

use crate::db::{StoreError, UserRepository};
use crate::services::account_service::{AccountError, AccountStore};

pub struct SeaOrmAccountStore {
    users: UserRepository,
}

impl SeaOrmAccountStore {
    #[must_use]
    pub const fn new(users: UserRepository) -> Self {
        Self { users }
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => Self::Validation(e),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[async_trait]
impl AccountStore for SeaOrmAccountStore {
    async fn register(&self, username: &str, password: &str) -> Result<(), AccountError> {
        match self.users.add_user(username, None, password).await? {
            Some(_) => Ok(()),
            None => Err(AccountError::Duplicate),
        }
    }

    async fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        let user = self.users.verify_credentials(username, password).await?;
        Ok(user.is_some())
    }

    async fn count(&self) -> Result<u64, AccountError> {
        self.users
            .count()
            .await
            .map_err(|e| AccountError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_store;

    #[tokio::test]
    async fn test_accounts_persist_through_user_repository() {
        let store = memory_store().await;
        let accounts = SeaOrmAccountStore::new(store.users());

        accounts.register("admin", "password123").await.unwrap();
        assert!(matches!(
            accounts.register("admin", "again").await,
            Err(AccountError::Duplicate)
        ));

        assert!(accounts.verify("admin", "password123").await.unwrap());
        assert!(!accounts.verify("admin", "wrong").await.unwrap());
        assert!(store.users().get_by_username("admin").await.unwrap().is_some());
        assert_eq!(accounts.count().await.unwrap(), 1);
    }
}
