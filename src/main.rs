//! Herald notification orchestration service.
//!
//! Main entry point for the orchestrator. Initializes the store, the
//! idempotency cache, the queue producers, and the external-service
//! clients, then serves the HTTP API until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use herald_api::{
    clients::{
        HttpTemplateClient, HttpUserClient, MockTemplateService, MockUserService, TemplateApi,
        TemplateClientConfig, UserApi, UserClientConfig,
    },
    logging, start_server, AppState, Config, IdempotencyCache, Orchestrator,
    RedisIdempotencyCache,
};
use herald_core::{storage::notifications::NotificationStore, Storage};
use herald_queue::Manager;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

/// Deadline for the startup connection-health check.
const STARTUP_PING_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logging::init(&config.log_level, &config.log_format);

    info!(
        port = config.port,
        mock_services = config.use_mock_services,
        database_url = %config.database_url_masked(),
        "starting herald orchestrator"
    );

    let pool = create_database_pool(&config).await?;
    run_migrations(&pool).await?;
    info!("database schema ready");

    let storage = Arc::new(Storage::new(pool.clone()));

    let manager = Arc::new(
        Manager::connect(&config.manager_config())
            .await
            .context("failed to initialize queue manager")?,
    );
    info!(
        email_topic = %config.email_topic,
        push_topic = %config.push_topic,
        "queue manager initialized"
    );

    let idempotency: Arc<dyn IdempotencyCache> = Arc::new(
        RedisIdempotencyCache::connect(&config.redis_url(), config.idempotency_ttl)
            .await
            .context("failed to connect to idempotency cache")?,
    );

    let (users, templates) = build_clients(&config)?;

    let store: Arc<dyn NotificationStore> = storage.notifications.clone();
    let orchestrator = Arc::new(Orchestrator::new(users, templates, manager.clone(), store));

    let state = AppState::new(orchestrator, idempotency, storage);
    let addr = config.server_addr()?;

    info!(addr = %addr, "herald is ready to accept notifications");
    start_server(state, &config, addr).await?;

    if let Err(err) = manager.close().await {
        error!(error = %err, "failed to close queue manager");
    }
    pool.close().await;
    info!("herald shutdown complete");

    Ok(())
}

/// Builds the user and template clients, honoring the mock-services flag.
fn build_clients(config: &Config) -> Result<(Arc<dyn UserApi>, Arc<dyn TemplateApi>)> {
    if config.use_mock_services {
        info!("using mock services for development");
        return Ok((Arc::new(MockUserService), Arc::new(MockTemplateService)));
    }

    let users = HttpUserClient::new(UserClientConfig {
        base_url: config.user_service_url.clone(),
        timeout: config.user_service_timeout,
        breaker: config.breaker_config("user-service"),
        retry: config.retry_config(),
    })?;

    let templates = HttpTemplateClient::new(TemplateClientConfig {
        base_url: config.template_service_url.clone(),
        timeout: config.template_service_timeout,
        breaker: config.breaker_config("template-service"),
        retry: config.retry_config(),
    })?;

    Ok((Arc::new(users), Arc::new(templates)))
}

/// Creates the database connection pool with startup retry.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut retries = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(config.postgres_max_conns)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url())
            .await
        {
            Ok(pool) => {
                let ping = sqlx::query("SELECT 1").fetch_one(&pool);
                tokio::time::timeout(STARTUP_PING_TIMEOUT, ping)
                    .await
                    .context("database startup ping timed out")?
                    .context("failed to verify database connection")?;

                info!(
                    host = %config.postgres_host,
                    database = %config.postgres_db,
                    "database connection established"
                );
                return Ok(pool);
            },
            Err(_e) if retries < MAX_RETRIES => {
                retries += 1;
                info!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    "database connection failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("failed to create database connection pool after retries");
            },
        }
    }
}

/// Ensures the notification schema exists.
async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::query(
        r"
        DO $$ BEGIN
            CREATE TYPE notification_type AS ENUM ('email', 'push');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        ",
    )
    .execute(pool)
    .await
    .context("failed to create notification_type enum")?;

    sqlx::query(
        r"
        DO $$ BEGIN
            CREATE TYPE notification_status AS ENUM ('pending', 'delivered', 'failed');
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        ",
    )
    .execute(pool)
    .await
    .context("failed to create notification_status enum")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY,
            user_id TEXT NOT NULL,
            template_code TEXT NOT NULL,
            notification_type notification_type NOT NULL,
            status notification_status NOT NULL,
            priority TEXT NOT NULL DEFAULT 'normal',
            variables JSONB NOT NULL DEFAULT '{}',
            metadata JSONB,
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            scheduled_for TIMESTAMPTZ
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create notifications table")?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_status ON notifications(status)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_created_at ON notifications(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_user_status \
         ON notifications(user_id, status)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("failed to create notifications index")?;
    }

    sqlx::query(
        r"
        CREATE OR REPLACE FUNCTION set_notifications_updated_at()
        RETURNS TRIGGER AS $$
        BEGIN
            NEW.updated_at = NOW();
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        ",
    )
    .execute(pool)
    .await
    .context("failed to create updated_at trigger function")?;

    sqlx::query(
        r"
        DO $$ BEGIN
            CREATE TRIGGER notifications_set_updated_at
            BEFORE UPDATE ON notifications
            FOR EACH ROW EXECUTE FUNCTION set_notifications_updated_at();
        EXCEPTION WHEN duplicate_object THEN NULL;
        END $$
        ",
    )
    .execute(pool)
    .await
    .context("failed to create updated_at trigger")?;

    Ok(())
}
