use crate::domain::jobs::{JobId, ModerationLabel, SourceRef};
use crate::domain::policy::Decision;
use async_trait::async_trait;

/// A staged source plus a URL the classifier can read it from.
#[derive(Debug, Clone)]
pub struct StagedSource {
    pub job_id: JobId,
    pub source: SourceRef,
    pub share_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("classification failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("decision function unavailable: {0}")]
    Unavailable(String),
    #[error("decision function returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Content-safety classifier (AWS Rekognition or a remote endpoint).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    async fn classify(&self, staged: &StagedSource) -> Result<Vec<ModerationLabel>, ClassifierError>;
}

/// Turns classifier labels into approve/reject.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationDecider: Send + Sync {
    async fn decide(
        &self,
        job_id: JobId,
        labels: &[ModerationLabel],
    ) -> Result<Decision, DecisionError>;
}
