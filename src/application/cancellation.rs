use crate::application::error::PipelineError;
use crate::domain::events::JobEvent;
use crate::domain::jobs::{Job, JobId};
use crate::ports::events::JobEventSink;
use crate::ports::repository::JobRepository;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MAX_CANCEL_ATTEMPTS: usize = 5;

/// Cancellation tokens of the jobs running in this process.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<JobId, CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: JobId) -> CancellationToken {
        self.tokens.entry(id).or_default().clone()
    }

    /// Fires the token of a running job. Returns false when the job is not
    /// running here.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: JobId) {
        self.tokens.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Client-initiated cancellation: marks the job Failed(cancelled) and stops
/// its worker.
pub struct CancellationService {
    repo: Arc<dyn JobRepository>,
    events: Arc<dyn JobEventSink>,
    registry: Arc<CancellationRegistry>,
}

impl CancellationService {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        events: Arc<dyn JobEventSink>,
        registry: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            repo,
            events,
            registry,
        }
    }

    pub async fn cancel(&self, id: JobId) -> Result<Job, PipelineError> {
        for _ in 0..MAX_CANCEL_ATTEMPTS {
            let mut job = self.repo.get(id).await?.ok_or(PipelineError::NotFound(id))?;
            if job.stage.is_terminal() {
                return Err(PipelineError::AlreadyTerminal {
                    id,
                    stage: job.stage,
                });
            }

            let observed = job.stage;
            job.cancel()?;
            if self.repo.save_if(&job, observed).await? {
                let signalled = self.registry.cancel(id);
                self.events.publish(JobEvent::from_job(&job));
                tracing::info!(job_id = %id, from = %observed, signalled, "Cancelled job");
                return Ok(job);
            }
            tracing::debug!(job_id = %id, "Job advanced during cancellation, retrying");
        }

        Err(PipelineError::Internal(format!(
            "job {} kept changing, cancellation not applied",
            id
        )))
    }
}
