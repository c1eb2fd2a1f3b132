//! Startup schema creation with linear backoff while the database warms up.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::executor::is_connectivity_error;
use crate::entities::{posts, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Posts,
    Users,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Users => "users",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
        }
    }

    /// Delay after the given failed attempt (1-based): `base * attempt`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt)
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database still unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: DbErr,
    },

    #[error("schema creation failed: {0}")]
    Schema(#[source] DbErr),
}

/// Create the given tables if they do not exist yet.
///
/// Connectivity failures are retried per `policy`; anything else is returned
/// on the first occurrence.
pub async fn ensure_schema(
    conn: &DatabaseConnection,
    tables: &[Table],
    policy: RetryPolicy,
) -> Result<(), BootstrapError> {
    retry_while_unreachable(policy, |_| create_tables(conn, tables)).await?;

    let names: Vec<_> = tables.iter().map(|t| t.name()).collect();
    info!(tables = ?names, "Database schema ready");
    Ok(())
}

/// Runs `attempt` until it succeeds, fails with a non-connectivity error,
/// or `policy.max_attempts` connectivity failures happened in a row.
///
/// Returns the number of attempts made on success.
pub async fn retry_while_unreachable<F, Fut>(
    policy: RetryPolicy,
    mut attempt: F,
) -> Result<u32, BootstrapError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), DbErr>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;

    loop {
        match attempt(n).await {
            Ok(()) => return Ok(n),
            Err(err) if is_connectivity_error(&err) => {
                warn!(
                    attempt = n,
                    max_attempts,
                    error = %err,
                    "Waiting for database"
                );
                if n >= max_attempts {
                    return Err(BootstrapError::Unreachable {
                        attempts: n,
                        source: err,
                    });
                }
                tokio::time::sleep(policy.delay_after(n)).await;
                n += 1;
            }
            Err(err) => return Err(BootstrapError::Schema(err)),
        }
    }
}

async fn create_tables(conn: &DatabaseConnection, tables: &[Table]) -> Result<(), DbErr> {
    conn.ping().await?;

    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    for table in tables {
        let stmt = match table {
            Table::Posts => create_statement(&schema, posts::Entity),
            Table::Users => create_statement(&schema, users::Entity),
        };
        conn.execute(backend.build(&stmt)).await?;
    }

    Ok(())
}

fn create_statement<E: EntityTrait>(
    schema: &Schema,
    entity: E,
) -> sea_orm::sea_query::TableCreateStatement {
    schema
        .create_table_from_entity(entity)
        .if_not_exists()
        .to_owned()
}
