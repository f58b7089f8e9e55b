use crate::domain::jobs::{Job, JobId, JobStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress notification emitted on every stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub stage: JobStage,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl JobEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            stage: job.stage,
            at: job.updated_at,
            detail: job
                .result_url()
                .map(String::from)
                .or_else(|| job.reason()),
        }
    }
}
