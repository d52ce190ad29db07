//! Database access layer implementing the repository pattern for notification
//! persistence.
//!
//! The repository layer acts as an anti-corruption layer, translating between
//! domain models and the database schema. All database operations go through
//! these repositories; direct SQL queries outside this module are forbidden
//! to maintain consistency.

use std::{sync::Arc, time::Duration};

use sqlx::PgPool;

pub mod notifications;

use crate::error::{CoreError, Result};

/// Timeout for the on-demand readiness ping.
const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

/// Container for repository instances providing unified database access.
///
/// Entry point for all database operations. Manages a shared connection pool
/// and provides type-safe access to each domain repository.
#[derive(Clone)]
pub struct Storage {
    /// Repository for notification record operations.
    pub notifications: Arc<notifications::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { notifications: Arc::new(notifications::Repository::new(pool)) }
    }

    /// Performs a health check on the database connection.
    ///
    /// Executes a simple query with a 2 second deadline. Used by the
    /// `/health/ready` endpoint for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy or the
    /// query times out.
    pub async fn health_check(&self) -> Result<()> {
        let pool = self.notifications.pool();
        let ping = sqlx::query_as::<_, (i32,)>("SELECT 1").fetch_one(&*pool);

        match tokio::time::timeout(READINESS_TIMEOUT, ping).await {
            Ok(result) => {
                result?;
                Ok(())
            },
            Err(_) => Err(CoreError::Database(format!(
                "readiness ping timed out after {}s",
                READINESS_TIMEOUT.as_secs()
            ))),
        }
    }
}
