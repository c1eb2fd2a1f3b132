use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::models::ValidationError;

pub mod bootstrap;
pub mod executor;
pub mod repositories;

pub use bootstrap::{BootstrapError, RetryPolicy, Table};
pub use executor::{DataAccessError, SessionExecutor};
pub use repositories::post::PostRepository;
pub use repositories::user::UserRepository;

/// Failure of a repository call that validates its input first.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error("password hashing failed: {0}")]
    Credential(String),
}

#[derive(Clone)]
pub struct Store {
    executor: SessionExecutor,
    posts: PostRepository,
    users: UserRepository,
}

impl Store {
    /// Build the pool and executor. No connection is opened for server
    /// databases until the first unit of work (or the schema bootstrap) runs.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url();
        let in_memory = url.starts_with("sqlite::memory:");

        let mut opt = ConnectOptions::new(url);
        opt.acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .test_before_acquire(true)
            .sqlx_logging(false);

        if in_memory {
            // Every pooled connection to `sqlite::memory:` is its own database.
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(1800))
                .connect_lazy(true);
        }

        let conn = Database::connect(opt)
            .await
            .context("Failed to configure database pool")?;

        info!(
            backend = ?conn.get_database_backend(),
            max_concurrent_units = config.max_concurrent_units,
            "Database pool configured"
        );

        Ok(Self::from_connection(conn, config.max_concurrent_units))
    }

    #[must_use]
    pub fn from_connection(conn: DatabaseConnection, max_concurrent_units: usize) -> Self {
        let executor = SessionExecutor::new(conn, max_concurrent_units);
        Self {
            posts: PostRepository::new(executor.clone()),
            users: UserRepository::new(executor.clone()),
            executor,
        }
    }

    #[must_use]
    pub fn posts(&self) -> PostRepository {
        self.posts.clone()
    }

    #[must_use]
    pub fn users(&self) -> UserRepository {
        self.users.clone()
    }

    pub async fn ensure_schema(
        &self,
        tables: &[Table],
        policy: RetryPolicy,
    ) -> Result<(), BootstrapError> {
        bootstrap::ensure_schema(self.executor.connection(), tables, policy).await
    }

    /// Stop accepting units of work and close the pool.
    pub async fn shutdown(self) {
        self.executor.close();
        if let Err(e) = self.executor.connection().clone().close().await {
            warn!(error = %e, "Closing database pool failed");
        }
    }
}
