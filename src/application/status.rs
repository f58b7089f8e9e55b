use crate::application::error::PipelineError;
use crate::domain::jobs::{FailureKind, Job, JobId, JobStage};
use crate::ports::repository::JobRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// What a client sees of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub stage: JobStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flagged_categories: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            stage: job.stage,
            result_url: job.result_url().map(String::from),
            reason: job.reason(),
            failure_kind: job.failure.as_ref().map(|f| f.kind),
            flagged_categories: job
                .verdict
                .as_ref()
                .filter(|v| !v.approved)
                .map(|v| v.flagged_categories.clone())
                .unwrap_or_default(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Read-only view over job state.
pub struct StatusReporter {
    repo: Arc<dyn JobRepository>,
}

impl StatusReporter {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self { repo }
    }

    pub async fn status(&self, id: JobId) -> Result<JobStatusView, PipelineError> {
        let job = self.repo.get(id).await?.ok_or(PipelineError::NotFound(id))?;
        Ok(JobStatusView::from(&job))
    }
}
