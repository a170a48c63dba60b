use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::Pipeline;

const QUEUE_KEY: &str = "doit_analysis:tasks";
const PROCESSING_KEY: &str = "doit_analysis:processing";

/// Task message serialized into Redis. Redelivery of the same message must
/// produce the same net effect as a single delivery; the worker enforces
/// that through conditional job-status updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub job_id: Uuid,
    pub pipeline: Pipeline,
    #[serde(default)]
    pub attempt: i32,
}

/// Redis-backed at-least-once task queue. A dequeued task sits on the
/// processing list until acked (`complete`) or nacked (`requeue`).
pub struct TaskQueue {
    client: redis::Client,
}

impl TaskQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a processing task.
    pub async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(task).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue a task for processing (pop with move to the processing list).
    pub async fn dequeue(&self) -> Result<Option<Task>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let task: Task = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Ack: remove the task from the processing list.
    pub async fn complete(&self, task: &Task) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(task).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Nack: push the task back onto the queue with a bumped attempt count
    /// and drop the in-flight copy. The caller decides when attempts are
    /// exhausted and the task must dead-letter instead.
    pub async fn requeue(&self, task: &Task) -> Result<(), QueueError> {
        let retry = Task {
            attempt: task.attempt + 1,
            ..task.clone()
        };
        self.enqueue(&retry).await?;
        self.complete(task).await
    }

    /// Remove a not-yet-delivered task from the queue. Used by a dispatcher
    /// that lost the status race to a concurrent notification and must take
    /// back its duplicate copy. Removing a task the worker already consumed
    /// is a no-op.
    pub async fn discard(&self, task: &Task) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(task).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(QUEUE_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move every in-flight task back onto the queue. Run at worker startup
    /// so tasks a crashed worker left on the processing list are redelivered.
    /// A reclaimed task another worker is still processing becomes a
    /// duplicate delivery, which the conditional job-status updates absorb.
    pub async fn reclaim_in_flight(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let in_flight: u64 = conn.llen(PROCESSING_KEY).await.map_err(QueueError::Redis)?;
        let mut moved = 0u64;
        for _ in 0..in_flight {
            let item: Option<String> = conn
                .rpoplpush(PROCESSING_KEY, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Get the current queue depth (pending tasks).
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
