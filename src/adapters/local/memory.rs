//! In-process job store and queue for single-process deployments and tests.

use crate::domain::jobs::{Job, JobId, JobStage};
use crate::ports::queue::{JobQueuePort, QueueError};
use crate::ports::repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(RepositoryError::Duplicate(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.get(&id).map(|job| job.clone()))
    }

    async fn save_if(&self, job: &Job, expected: JobStage) -> Result<bool, RepositoryError> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(mut stored) if stored.get().stage == expected => {
                stored.insert(job.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    pending: Mutex<VecDeque<JobId>>,
    ready: Notify,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self) -> Result<Option<JobId>, QueueError> {
        self.pending
            .lock()
            .map(|mut pending| pending.pop_front())
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobQueuePort for InMemoryQueue {
    async fn enqueue_job(&self, id: JobId) -> Result<(), QueueError> {
        self.pending
            .lock()
            .map_err(|_| QueueError::Backend("queue lock poisoned".to_string()))?
            .push_back(id);
        self.ready.notify_one();
        Ok(())
    }

    async fn dequeue_job(&self, timeout: Duration) -> Result<Option<JobId>, QueueError> {
        if let Some(id) = self.pop()? {
            return Ok(Some(id));
        }
        // Woken or timed out, whatever is queued now is ours to take
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
        self.pop()
    }
}
