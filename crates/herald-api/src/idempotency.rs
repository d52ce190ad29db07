//! TTL'd idempotency cache keyed by client request id.
//!
//! Maps a client-supplied `request_id` to the serialized response returned
//! on the original call. Entries are immutable within their TTL. Cache I/O
//! failures are soft by contract: the ingress handler logs them and
//! proceeds, never blocking a request on cache health.

use std::time::Duration;

use async_trait::async_trait;
use herald_core::models::NotificationResponse;
use redis::{aio::MultiplexedConnection, AsyncCommands};
use tracing::debug;

/// Key namespace for idempotency entries.
const KEY_PREFIX: &str = "idempotency";

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Idempotency cache contract.
///
/// `get` distinguishes an absent entry (`Ok(None)`) from an I/O failure
/// (`Err`); the pipeline treats only the latter as a soft fault.
#[async_trait]
pub trait IdempotencyCache: Send + Sync {
    /// Returns the cached response for a request id, if present.
    async fn get(&self, request_id: &str) -> anyhow::Result<Option<NotificationResponse>>;

    /// Stores a response under the configured TTL.
    async fn put(&self, request_id: &str, response: &NotificationResponse) -> anyhow::Result<()>;
}

/// Redis-backed idempotency cache.
pub struct RedisIdempotencyCache {
    connection: MultiplexedConnection,
    ttl: Duration,
}

impl RedisIdempotencyCache {
    /// Connects to Redis and prepares a multiplexed connection.
    pub async fn connect(url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        debug!(ttl_secs = ttl.as_secs(), "idempotency cache connected");

        Ok(Self { connection, ttl })
    }

    fn cache_key(request_id: &str) -> String {
        format!("{KEY_PREFIX}:{request_id}")
    }
}

#[async_trait]
impl IdempotencyCache for RedisIdempotencyCache {
    async fn get(&self, request_id: &str) -> anyhow::Result<Option<NotificationResponse>> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(Self::cache_key(request_id)).await?;

        match raw {
            Some(serialized) => {
                let response = serde_json::from_str(&serialized)?;
                debug!(request_id, "idempotency cache hit");
                Ok(Some(response))
            },
            None => Ok(None),
        }
    }

    async fn put(&self, request_id: &str, response: &NotificationResponse) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(response)?;
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(Self::cache_key(request_id), serialized, self.ttl.as_secs())
            .await?;

        debug!(request_id, ttl_secs = self.ttl.as_secs(), "idempotency entry stored");
        Ok(())
    }
}
