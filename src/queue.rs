//! Queue access - where tasks come from and results go to
//!
//! The Redis implementation keeps two connections: one parked in BLPOP for
//! the dispatcher, one shared by all workers for pushing results, so a
//! blocking pop never holds up a push.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::task::TaskData;

/// Redis key constants
pub mod keys {
    /// Inbound compile task queue
    pub const TASK_QUEUE: &str = "compile:tasks";

    /// Outbound queue of processed tasks
    pub const RESULT_QUEUE: &str = "compile:results";
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Wait briefly for the next task. `None` means nothing usable arrived
    /// and the caller should try again.
    async fn pull(&self) -> Result<Option<TaskData>>;

    /// Hand a processed task back to the judge
    async fn push(&self, data: &TaskData) -> Result<()>;
}

pub struct RedisQueue {
    client: redis::Client,
    consumer: ConnectionManager,
    producer: ConnectionManager,
    task_queue: String,
    result_queue: String,
    pull_timeout: Duration,
}

impl RedisQueue {
    pub async fn connect(
        redis_url: &str,
        task_queue: impl Into<String>,
        result_queue: impl Into<String>,
        pull_timeout: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let consumer = get_connection_with_retry(&client).await?;
        let producer = get_connection_with_retry(&client).await?;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client,
            consumer,
            producer,
            task_queue: task_queue.into(),
            result_queue: result_queue.into(),
            pull_timeout,
        })
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn pull(&self) -> Result<Option<TaskData>> {
        let mut conn = self.consumer.clone();
        let popped: Option<(String, String)> = conn
            .blpop(&self.task_queue, self.pull_timeout.as_secs_f64())
            .await
            .context("Redis BLPOP failed")?;

        let Some((_, payload)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str::<TaskData>(&payload) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                warn!("Failed to parse task data: {}. Data: {}", e, payload);
                Ok(None)
            }
        }
    }

    async fn push(&self, data: &TaskData) -> Result<()> {
        let json = serde_json::to_string(data)?;

        let mut conn = self.producer.clone();
        if let Err(e) = conn.rpush::<_, _, ()>(&self.result_queue, &json).await {
            warn!("Failed to push result: {}. Retrying on a new connection...", e);
            let mut conn = get_connection_with_retry(&self.client).await?;
            conn.rpush::<_, _, ()>(&self.result_queue, &json)
                .await
                .context("Failed to push result")?;
        }
        Ok(())
    }
}

/// Get a Redis connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> Result<ConnectionManager> {
    loop {
        match ConnectionManager::new(client.clone()).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in 3 seconds...",
                    e
                );
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
        }
    }
}
