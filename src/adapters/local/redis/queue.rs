//! Redis JobQueuePort implementation.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use super::JOB_QUEUE;
use crate::domain::jobs::JobId;
use crate::ports::queue::{JobMessage, JobQueuePort, QueueError};
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use std::time::Duration;

#[async_trait]
impl JobQueuePort for RedisPool {
    async fn enqueue_job(&self, id: JobId) -> Result<(), QueueError> {
        let body = JobMessage { job_id: id }.encode()?;
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(JOB_QUEUE, body)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        let mut conn = self.connection().await?;
        // BRPOP treats 0 as "block forever"
        let timeout_secs = timeout.as_secs_f64().max(0.01);
        let result: Option<(String, String)> = conn
            .brpop(JOB_QUEUE, timeout_secs)
            .await
            .map_err(RedisAdapterError::from)?;
        match result {
            Some((_, body)) => Ok(Some(JobMessage::decode(&body)?.job_id)),
            None => Ok(None),
        }
    }
}
