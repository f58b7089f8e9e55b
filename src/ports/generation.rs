use crate::domain::jobs::{GenerationOptions, JobId};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInput {
    pub job_id: JobId,
    /// URL the generation service downloads the source from
    pub video_uri: String,
    pub options: GenerationOptions,
}

/// Remote task state as reported by the generation service.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteTaskState {
    Pending,
    Running { progress: Option<f32> },
    Succeeded { outputs: Vec<String> },
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service rejected the input: {0}")]
    Rejected(String),
    #[error("generation service unavailable: {0}")]
    Unavailable(String),
    #[error("generation service returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("output download incomplete: expected {expected} bytes, received {received}")]
    Incomplete { expected: u64, received: u64 },
    #[error("output i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Submit a video-to-video task, returning the remote task id
    async fn submit(&self, input: &GenerationInput) -> Result<String, GenerationError>;

    async fn poll(&self, task_id: &str) -> Result<RemoteTaskState, GenerationError>;

    /// Best-effort cancellation of a remote task
    async fn cancel(&self, task_id: &str) -> Result<(), GenerationError>;

    /// Download a finished output to `dest`, returning its size
    async fn fetch_output(&self, output_uri: &str, dest: &Path) -> Result<u64, GenerationError>;
}
