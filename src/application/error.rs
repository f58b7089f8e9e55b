use crate::domain::jobs::{FailureKind, JobId, JobStage, TransitionError};
use crate::domain::validation::ValidationError;
use crate::ports::queue::QueueError;
use crate::ports::repository::RepositoryError;
use crate::ports::storage::StorageError;
use std::time::Duration;

/// Everything a pipeline stage can fail with. Variants that end a job map
/// onto a [`FailureKind`] recorded on the job.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("moderation unavailable after {attempts} attempts: {reason}")]
    Moderation { attempts: u32, reason: String },
    #[error("generation timed out after {}s", .0.as_secs())]
    GenerationTimeout(Duration),
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("job {0} was cancelled")]
    Cancelled(JobId),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {id} is already {stage}")]
    AlreadyTerminal { id: JobId, stage: JobStage },
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation(_) => FailureKind::Validation,
            PipelineError::Moderation { .. } => FailureKind::Moderation,
            PipelineError::GenerationTimeout(_) => FailureKind::GenerationTimeout,
            PipelineError::Generation(_) => FailureKind::Generation,
            PipelineError::Storage(_) => FailureKind::Storage,
            PipelineError::Cancelled(_) => FailureKind::Cancelled,
            PipelineError::NotFound(_)
            | PipelineError::AlreadyTerminal { .. }
            | PipelineError::Internal(_) => FailureKind::Internal,
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(err: RepositoryError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

impl From<QueueError> for PipelineError {
    fn from(err: QueueError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

impl From<TransitionError> for PipelineError {
    fn from(err: TransitionError) -> Self {
        PipelineError::Internal(err.to_string())
    }
}
