use crate::domain::jobs::JobId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wire form of a queued job, shared by every queue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
}

impl JobMessage {
    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    pub fn decode(body: &str) -> Result<Self, QueueError> {
        serde_json::from_str(body).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue message could not be (de)serialized: {0}")]
    Serialization(String),
    #[error("queue backend error: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job for the worker pool
    async fn enqueue_job(&self, id: JobId) -> Result<(), QueueError>;

    /// Dequeue a job, waiting at most `timeout`
    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<JobId>, QueueError>;
}
