use crate::domain::jobs::{Job, JobId, JobStage};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("job {0} already exists")]
    Duplicate(JobId),
    #[error("job record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("job store error: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job; fails if the id is taken
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError>;

    /// Get job state
    async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// Replace the stored job only if its stage still equals `expected`.
    /// Returns `false` when another writer moved the job first.
    async fn save_if(&self, job: &Job, expected: JobStage) -> Result<bool, RepositoryError>;
}
