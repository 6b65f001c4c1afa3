//! Redis Streams message bus
//!
//! Subjects map to streams and queue groups map to stream consumer groups:
//!
//! - publish is `XADD <subject> MAXLEN ~ <n> * payload <bytes>`
//! - joining a group is `XGROUP CREATE <subject> <group> $ MKSTREAM`
//!   (an existing group is reused)
//! - every subscriber is a uniquely named consumer reading with
//!   `XREADGROUP GROUP <group> <consumer> COUNT 1 BLOCK <ms> STREAMS <subject> >`
//!
//! Entries are acknowledged as soon as they are read, so a consumer that
//! crashes mid-probe loses the message instead of leaving it pending for
//! redelivery.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::{BusError, Delivery, DeliverySource, MessageBus, Subscription};

/// Stream entry field holding the message body
const PAYLOAD_FIELD: &str = "payload";

/// Redis bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisBusConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,

    /// Connection pool size for publishing
    pub pool_size: usize,

    /// How long one XREADGROUP call blocks, in milliseconds
    pub block_ms: usize,

    /// Approximate upper bound on stream length
    pub max_stream_len: usize,

    /// Pause after a failed read before trying again, in milliseconds
    pub read_error_backoff_ms: u64,
}

impl Default for RedisBusConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 8,
            block_ms: 5000,
            max_stream_len: 10_000,
            read_error_backoff_ms: 1000,
        }
    }
}

impl RedisBusConfig {
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

/// [`MessageBus`] backed by Redis Streams consumer groups
pub struct RedisBus {
    client: redis::Client,
    pool: Pool,
    config: RedisBusConfig,
}

impl RedisBus {
    /// Connect and verify the server answers PING
    pub async fn connect(config: RedisBusConfig) -> Result<Self, BusError> {
        let client =
            redis::Client::open(config.url.as_str()).map_err(|e| BusError::Connect(e.to_string()))?;

        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| BusError::Connect(format!("failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BusError::Connect(format!("failed to create pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis message bus");

        Ok(Self {
            client,
            pool,
            config,
        })
    }

    /// Create the consumer group if it does not exist yet
    async fn ensure_group(
        conn: &mut MultiplexedConnection,
        subject: &str,
        group: &str,
    ) -> Result<(), redis::RedisError> {
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(subject, group, "$").await;

        match created {
            Ok(()) => {
                tracing::info!(subject, group, "Created stream consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let publish_error = |reason: String| BusError::Publish {
            subject: subject.to_string(),
            reason,
        };

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        let _: String = conn
            .xadd_maxlen(
                subject,
                StreamMaxlen::Approx(self.config.max_stream_len),
                "*",
                &[(PAYLOAD_FIELD, payload.as_slice())],
            )
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        Ok(())
    }

    async fn queue_subscribe(&self, subject: &str, group: &str) -> Result<Subscription, BusError> {
        let subscribe_error = |reason: String| BusError::Subscribe {
            subject: subject.to_string(),
            group: group.to_string(),
            reason,
        };

        // Blocking reads get a connection of their own so they never stall publishes
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        Self::ensure_group(&mut conn, subject, group)
            .await
            .map_err(|e| subscribe_error(e.to_string()))?;

        let consumer = format!("{group}-{}", uuid::Uuid::new_v4().simple());

        tracing::debug!(subject, group, consumer = %consumer, "Joined stream consumer group");

        let source = StreamSource {
            conn,
            subject: subject.to_string(),
            group: group.to_string(),
            options: StreamReadOptions::default()
                .group(group, &consumer)
                .count(1)
                .block(self.config.block_ms),
            error_backoff: Duration::from_millis(self.config.read_error_backoff_ms),
            consumer,
        };

        Ok(Subscription::new(subject, group, Box::new(source)))
    }
}

struct StreamSource {
    conn: MultiplexedConnection,
    subject: String,
    group: String,
    consumer: String,
    options: StreamReadOptions,
    error_backoff: Duration,
}

/// Body of a stream entry, `None` when the entry carries no payload field
fn entry_payload(entry: &StreamId) -> Option<Vec<u8>> {
    entry.get::<Vec<u8>>(PAYLOAD_FIELD)
}

impl StreamSource {
    /// Read and acknowledge the next entry
    async fn read_one(&mut self) -> redis::RedisResult<Option<StreamId>> {
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[self.subject.as_str()], &[">"], &self.options)
            .await?;

        let Some(entry) = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next()
        else {
            return Ok(None);
        };

        let _: i64 = self
            .conn
            .xack(&self.subject, &self.group, &[entry.id.as_str()])
            .await?;

        Ok(Some(entry))
    }
}

#[async_trait]
impl DeliverySource for StreamSource {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        loop {
            match self.read_one().await {
                Ok(Some(entry)) => {
                    let Some(payload) = entry_payload(&entry) else {
                        tracing::warn!(
                            subject = %self.subject,
                            entry_id = %entry.id,
                            "Skipping stream entry without payload"
                        );
                        continue;
                    };
                    tracing::trace!(
                        subject = %self.subject,
                        consumer = %self.consumer,
                        entry_id = %entry.id,
                        "Stream entry delivered"
                    );
                    return Some(Delivery::new(self.subject.clone(), payload));
                }
                // BLOCK elapsed with nothing new
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        subject = %self.subject,
                        group = %self.group,
                        error = %e,
                        "Stream read failed"
                    );
                    tokio::time::sleep(self.error_backoff).await;
                }
            }
        }
    }
}
