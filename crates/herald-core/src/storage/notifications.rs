//! Repository for notification record database operations.
//!
//! Provides the durable audit trail behind the orchestration pipeline:
//! records are inserted exactly once per ingress call and mutated only by
//! status transitions. The `NotificationStore` trait is the seam the
//! pipeline depends on, allowing in-memory fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::{
    error::{CoreError, Result},
    models::{NotificationId, NotificationRecord, NotificationStatus},
};

/// Persistence contract for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts a new record.
    ///
    /// A duplicate `id` is a fatal constraint violation: ids are generated
    /// exactly once per request, so a collision indicates a pipeline bug.
    async fn create(&self, record: &NotificationRecord) -> Result<()>;

    /// Fetches a record by id.
    async fn find_by_id(&self, id: NotificationId) -> Result<NotificationRecord>;

    /// Transitions a record's status, refreshing `updated_at`.
    ///
    /// Matches exactly one row; zero affected rows yield `NotFound`. Never
    /// inserts. Terminal records cannot move back to `pending`.
    async fn update_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Lists a user's records, newest first, with hard pagination bounds.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NotificationRecord>>;
}

/// PostgreSQL-backed notification repository.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }
}

#[async_trait]
impl NotificationStore for Repository {
    async fn create(&self, record: &NotificationRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO notifications (
                id, user_id, template_code, notification_type, status, priority,
                variables, metadata, error_message, created_at, updated_at, scheduled_for
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.template_code)
        .bind(record.notification_type)
        .bind(record.status)
        .bind(&record.priority)
        .bind(&record.variables)
        .bind(record.metadata.as_ref())
        .bind(record.error_message.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.scheduled_for)
        .execute(&*self.pool)
        .await?;

        debug!(
            notification_id = %record.id,
            user_id = %record.user_id,
            "notification record created"
        );

        Ok(())
    }

    async fn find_by_id(&self, id: NotificationId) -> Result<NotificationRecord> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r"
            SELECT id, user_id, template_code, notification_type, status, priority,
                   variables, metadata, error_message, created_at, updated_at, scheduled_for
            FROM notifications
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        record.ok_or_else(|| CoreError::NotFound(format!("notification {id}")))
    }

    async fn update_status(
        &self,
        id: NotificationId,
        status: NotificationStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        // The status predicate refuses pending transitions on terminal rows.
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET status = $1, error_message = $2, updated_at = NOW()
            WHERE id = $3
              AND NOT (status IN ('delivered', 'failed') AND $1 = 'pending')
            ",
        )
        .bind(status)
        .bind(error_message)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("notification {id}")));
        }

        debug!(notification_id = %id, status = %status, "notification status updated");

        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NotificationRecord>> {
        if limit <= 0 {
            return Err(CoreError::InvalidInput("limit must be positive".to_string()));
        }

        let records = sqlx::query_as::<_, NotificationRecord>(
            r"
            SELECT id, user_id, template_code, notification_type, status, priority,
                   variables, metadata, error_message, created_at, updated_at, scheduled_for
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&*self.pool)
        .await?;

        Ok(records)
    }
}
