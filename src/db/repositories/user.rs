use chrono::{SubsecRound, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, Statement,
};
use tracing::warn;

use crate::constants::pagination::MAX_LIMIT;
use crate::db::StoreError;
use crate::db::executor::{DataAccessError, SessionExecutor};
use crate::entities::users;
use crate::models::user::{User, UserDraft};
use crate::services::password;

#[derive(Clone)]
pub struct UserRepository {
    executor: SessionExecutor,
}

impl UserRepository {
    #[must_use]
    pub const fn new(executor: SessionExecutor) -> Self {
        Self { executor }
    }

    /// Register a user. `Ok(None)` means the username is already taken.
    pub async fn add_user(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let draft = UserDraft::new(username, email.map(str::to_string), password)?;
        let UserDraft {
            username,
            email,
            password,
        } = draft;

        let password_hash = password::hash_password_blocking(password)
            .await
            .map_err(|e| StoreError::Credential(e.to_string()))?;
        let now = Utc::now().trunc_subsecs(6);

        let result = self
            .executor
            .run("users.add", move |txn| {
                let row = users::ActiveModel {
                    username: Set(username),
                    email: Set(email),
                    password_hash: Set(password_hash),
                    created_at: Set(now),
                    ..Default::default()
                };
                Box::pin(insert_user(txn, row))
            })
            .await;

        match result {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.is_unique_violation() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, DataAccessError> {
        let username = username.to_string();
        let row = self
            .executor
            .run("users.get_by_username", move |txn| {
                Box::pin(find_by_username(txn, username))
            })
            .await?;
        Ok(row.map(User::from))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>, DataAccessError> {
        let row = self
            .executor
            .run("users.get_by_id", move |txn| {
                Box::pin(users::Entity::find_by_id(id).one(txn))
            })
            .await?;
        Ok(row.map(User::from))
    }

    /// Oldest first by id. `limit` is clamped to `1..=100`.
    pub async fn list(&self, offset: u64, limit: u64) -> Result<Vec<User>, DataAccessError> {
        let limit = limit.clamp(1, MAX_LIMIT);
        let rows = self
            .executor
            .run("users.list", move |txn| {
                Box::pin(
                    users::Entity::find()
                        .order_by_asc(users::Column::Id)
                        .offset(offset)
                        .limit(limit)
                        .all(txn),
                )
            })
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn count(&self) -> Result<u64, DataAccessError> {
        self.executor
            .run("users.count", |txn| {
                Box::pin(users::Entity::find().count(txn))
            })
            .await
    }

    /// Returns the user when `password` matches the stored hash.
    ///
    /// Unknown users and wrong passwords are both `Ok(None)`.
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let lookup = username.to_string();
        let Some(row) = self
            .executor
            .run("users.verify_credentials", move |txn| {
                Box::pin(find_by_username(txn, lookup))
            })
            .await?
        else {
            return Ok(None);
        };

        let matches = match password::verify_password_blocking(
            password.to_string(),
            row.password_hash.clone(),
        )
        .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!(username = %row.username, error = %e, "Stored password hash is unreadable");
                false
            }
        };

        Ok(matches.then(|| User::from(row)))
    }

    /// `SELECT 1` through the executor. Never raises.
    pub async fn health_check(&self) -> bool {
        let result = self
            .executor
            .run("users.health_check", |txn| Box::pin(ping(txn)))
            .await;

        if let Err(e) = &result {
            warn!(error = %e, "Database health check failed");
        }
        result.is_ok()
    }
}

async fn insert_user(txn: &DatabaseTransaction, row: users::ActiveModel) -> Result<User, DbErr> {
    let model = row.insert(txn).await?;
    Ok(User::from(model))
}

async fn find_by_username(
    txn: &DatabaseTransaction,
    username: String,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(txn)
        .await
}

async fn ping(txn: &DatabaseTransaction) -> Result<(), DbErr> {
    let backend = txn.get_database_backend();
    txn.execute(Statement::from_string(backend, "SELECT 1"))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_store;

    #[tokio::test]
    async fn test_add_user_and_lookup() {
        let repo = memory_store().await.users();

        let user = repo
            .add_user("alice", Some("alice@example.com"), "s3cret")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name, user);
        let by_id = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_id, user);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_none_not_error() {
        let repo = memory_store().await.users();

        assert!(repo.add_user("bob", None, "pw1").await.unwrap().is_some());
        let duplicate = repo.add_user("bob", Some("bob@example.com"), "pw2").await;

        assert!(matches!(duplicate, Ok(None)));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_input_is_validation_error() {
        let repo = memory_store().await.users();
        let err = repo.add_user("", None, "pw").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let repo = memory_store().await.users();
        repo.add_user("carol", None, "right").await.unwrap();

        let ok = repo.verify_credentials("carol", "right").await.unwrap();
        assert_eq!(ok.map(|u| u.username).as_deref(), Some("carol"));

        assert!(repo.verify_credentials("carol", "wrong").await.unwrap().is_none());
        assert!(repo.verify_credentials("nobody", "right").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_and_health_check() {
        let repo = memory_store().await.users();
        for name in ["u1", "u2", "u3"] {
            repo.add_user(name, None, "pw").await.unwrap();
        }

        let names: Vec<String> = repo
            .list(1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["u2", "u3"]);
        assert!(repo.health_check().await);
    }
}
