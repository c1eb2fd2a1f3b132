//! Runs units of database work off the request path.
//!
//! Every call to [`SessionExecutor::run`] acquires one pooled connection,
//! opens a transaction on it, hands the transaction to the unit of work and
//! then commits (on `Ok`) or rolls back (on `Err`). The unit runs on its own
//! spawned task behind a process-wide semaphore, so at most
//! `max_concurrent_units` units hold a connection at once and a caller that
//! goes away does not abort a unit that already started.

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, SqlErr, TransactionTrait};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// A unit of work borrows the transaction for the duration of its future.
pub type UnitFuture<'c, T> = BoxFuture<'c, Result<T, DbErr>>;

#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("database operation failed: {0}")]
    Database(#[from] DbErr),

    #[error("database worker failed: {0}")]
    Worker(String),

    #[error("database executor is shut down")]
    Closed,
}

impl DataAccessError {
    /// True when the failure is a uniqueness-constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(err) => matches!(
                err.sql_err(),
                Some(SqlErr::UniqueConstraintViolation(_))
            ),
            _ => false,
        }
    }
}

/// Connection establishment and pool acquisition failures.
#[must_use]
pub const fn is_connectivity_error(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

#[derive(Clone)]
pub struct SessionExecutor {
    conn: DatabaseConnection,
    permits: Arc<Semaphore>,
}

impl SessionExecutor {
    #[must_use]
    pub fn new(conn: DatabaseConnection, max_concurrent_units: usize) -> Self {
        Self {
            conn,
            permits: Arc::new(Semaphore::new(max_concurrent_units.max(1))),
        }
    }

    /// The underlying pool. Only the schema bootstrapper talks to it directly.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Units currently allowed to start without waiting.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Execute `work` inside its own transaction.
    ///
    /// `unit` names the operation for logs and metrics.
    pub async fn run<T, F>(&self, unit: &'static str, work: F) -> Result<T, DataAccessError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> UnitFuture<'c, T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let permits = Arc::clone(&self.permits);
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| DataAccessError::Closed)?;
            run_unit(&conn, work).await
        });

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(DataAccessError::Worker(join_err.to_string())),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) if err.is_unique_violation() => "conflict",
            Err(_) => "error",
        };
        metrics::counter!("db_units_total", "unit" => unit, "outcome" => outcome).increment(1);
        metrics::histogram!("db_unit_duration_seconds", "unit" => unit)
            .record(start.elapsed().as_secs_f64());

        if let Err(err) = &result {
            if err.is_unique_violation() {
                debug!(unit, error = %err, "Unit of work hit a uniqueness constraint");
            } else {
                error!(unit, error = ?err, "Database operation failed");
            }
        }

        result
    }

    /// Stop admitting new units. Units already holding a permit finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}

async fn run_unit<T, F>(conn: &DatabaseConnection, work: F) -> Result<T, DataAccessError>
where
    F: for<'c> FnOnce(&'c DatabaseTransaction) -> UnitFuture<'c, T>,
{
    let txn = conn.begin().await?;

    match work(&txn).await {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed unit of work also failed");
            }
            Err(err.into())
        }
    }
}
