use crate::application::cancellation::CancellationRegistry;
use crate::application::dispatcher::TransformationDispatcher;
use crate::application::error::PipelineError;
use crate::application::moderation::ModerationGate;
use crate::application::publisher::ResultPublisher;
use crate::config::PipelineConfig;
use crate::domain::events::JobEvent;
use crate::domain::jobs::{Job, JobId, JobStage};
use crate::ports::events::JobEventSink;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::JobRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEQUEUE_WAIT: Duration = Duration::from_secs(5);
const MAX_FAILURE_WRITES: usize = 3;

/// Everything one job needs on its way from Uploaded to a terminal stage.
pub struct JobPipeline {
    repo: Arc<dyn JobRepository>,
    events: Arc<dyn JobEventSink>,
    gate: ModerationGate,
    dispatcher: TransformationDispatcher,
    publisher: ResultPublisher,
    config: Arc<PipelineConfig>,
}

impl JobPipeline {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        events: Arc<dyn JobEventSink>,
        gate: ModerationGate,
        dispatcher: TransformationDispatcher,
        publisher: ResultPublisher,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            repo,
            events,
            gate,
            dispatcher,
            publisher,
            config,
        }
    }

    /// Runs one job to completion. Failures are recorded on the job before
    /// being returned.
    pub async fn run(&self, id: JobId, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let Some(job) = self.repo.get(id).await? else {
            tracing::warn!(job_id = %id, "Dequeued unknown job");
            return Ok(());
        };
        if job.stage != JobStage::Uploaded {
            tracing::info!(job_id = %id, stage = %job.stage, "Job already picked up, skipping");
            if job.stage.is_terminal() {
                self.release_source(&job).await;
            }
            return Ok(());
        }

        let stop_watching = CancellationToken::new();
        tokio::spawn(watch_for_cancellation(
            self.repo.clone(),
            id,
            cancel.clone(),
            stop_watching.clone(),
            self.config.generation_poll_interval,
        ));
        let _stop_on_drop = stop_watching.drop_guard();
        let result = self.drive(job, cancel).await;

        if let Err(e) = &result {
            self.record_failure(id, e).await;
        }
        self.release_source_if_finished(id).await;
        result
    }

    async fn drive(&self, mut job: Job, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let id = job.id;

        // 1. Moderation
        job.start_moderation()?;
        self.advance(&job, JobStage::Uploaded).await?;

        let verdict = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled(id)),
            verdict = self.gate.evaluate(&job) => verdict?,
        };
        let approved = verdict.approved;
        job.record_verdict(verdict)?;
        if !approved {
            self.advance(&job, JobStage::Moderating).await?;
            tracing::info!(job_id = %id, reason = ?job.reason(), "Job rejected");
            return Ok(());
        }

        // 2. Generation
        job.begin_generation()?;
        self.advance(&job, JobStage::Moderating).await?;

        let submission = self.dispatcher.submit(&job, cancel).await?;
        job.mark_transformation_running(&submission.task_id)?;
        if let Err(e) = self.advance(&job, JobStage::Generating).await {
            self.dispatcher.abandon(id, submission).await;
            return Err(e);
        }

        let output = self.dispatcher.await_output(id, submission, cancel).await?;
        if cancel.is_cancelled() {
            tracing::info!(job_id = %id, "Discarding output of cancelled job");
            return Err(PipelineError::Cancelled(id));
        }

        // 3. Publication
        let stored = self.publisher.publish(id, &output).await?;
        drop(output);
        job.complete(stored.clone())?;

        match self.repo.save_if(&job, JobStage::Generating).await {
            Ok(true) => {
                self.events.publish(JobEvent::from_job(&job));
                tracing::info!(job_id = %id, url = %stored.url, "Job completed");
                Ok(())
            }
            Ok(false) => {
                self.retract(&stored).await;
                Err(PipelineError::Cancelled(id))
            }
            Err(e) => {
                self.retract(&stored).await;
                Err(e.into())
            }
        }
    }

    /// Persists `job` if the stored stage is still `expected`. Losing the
    /// race means the job was cancelled underneath us.
    async fn advance(&self, job: &Job, expected: JobStage) -> Result<(), PipelineError> {
        if !self.repo.save_if(job, expected).await? {
            return Err(PipelineError::Cancelled(job.id));
        }
        tracing::debug!(job_id = %job.id, stage = %job.stage, "Stage saved");
        self.events.publish(JobEvent::from_job(job));
        Ok(())
    }

    /// Staged sources are only needed until the job reaches a terminal stage.
    pub async fn release_source_if_finished(&self, id: JobId) {
        match self.repo.get(id).await {
            Ok(Some(job)) if job.stage.is_terminal() => self.release_source(&job).await,
            Ok(_) => {}
            Err(e) => tracing::warn!(job_id = %id, error = %e, "Could not check job before releasing source"),
        }
    }

    async fn release_source(&self, job: &Job) {
        if let Err(e) = self.publisher.release_source(&job.source).await {
            tracing::warn!(job_id = %job.id, key = %job.source.key, error = %e, "Failed to delete staged source");
        }
    }

    async fn retract(&self, stored: &crate::domain::jobs::StoredArtifact) {
        if let Err(e) = self.publisher.retract(stored).await {
            tracing::error!(key = %stored.key, error = %e, "Failed to retract artifact");
        }
    }

    /// Marks the job Failed unless it already reached a terminal stage.
    /// Cancellation is recorded by whoever cancelled.
    pub async fn record_failure(&self, id: JobId, error: &PipelineError) {
        if matches!(error, PipelineError::Cancelled(_)) {
            tracing::info!(job_id = %id, "Job stopped after cancellation");
            return;
        }
        tracing::warn!(job_id = %id, kind = ?error.failure_kind(), error = %error, "Job failed");

        for _ in 0..MAX_FAILURE_WRITES {
            let mut job = match self.repo.get(id).await {
                Ok(Some(job)) => job,
                Ok(None) => return,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to load job to record failure");
                    return;
                }
            };
            if job.stage.is_terminal() {
                return;
            }
            let observed = job.stage;
            if let Err(e) = job.fail(error.failure_kind(), error.to_string()) {
                tracing::error!(job_id = %id, error = %e, "Failure could not be applied");
                return;
            }
            match self.repo.save_if(&job, observed).await {
                Ok(true) => {
                    self.events.publish(JobEvent::from_job(&job));
                    return;
                }
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(job_id = %id, error = %e, "Failed to record failure");
                    return;
                }
            }
        }
    }
}

/// Cancels `token` once the stored job is Failed. Covers cancellations
/// issued by another process.
async fn watch_for_cancellation(
    repo: Arc<dyn JobRepository>,
    id: JobId,
    token: CancellationToken,
    stop: CancellationToken,
    every: Duration,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(every) => {}
        }
        match repo.get(id).await {
            Ok(Some(job)) if job.stage == JobStage::Failed => {
                tracing::info!(job_id = %id, "Job failed elsewhere, stopping worker");
                token.cancel();
                return;
            }
            Ok(Some(job)) if job.stage.is_terminal() => return,
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => tracing::warn!(job_id = %id, error = %e, "Cancellation check failed"),
        }
    }
}

/// Queue consumer. Each dequeued job runs in its own task so a panic
/// inside one job cannot take the worker down.
pub struct WorkerService {
    queue: Arc<dyn JobQueuePort>,
    pipeline: Arc<JobPipeline>,
    registry: Arc<CancellationRegistry>,
}

impl WorkerService {
    pub fn new(
        queue: Arc<dyn JobQueuePort>,
        pipeline: Arc<JobPipeline>,
        registry: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            queue,
            pipeline,
            registry,
        }
    }

    pub async fn run_worker_loop(&self, worker_id: usize) {
        tracing::info!(worker_id, "Worker started");
        loop {
            match self.queue.dequeue_job(DEQUEUE_WAIT).await {
                Ok(Some(id)) => {
                    if let Err(e) = self.process_job(id, worker_id).await {
                        tracing::debug!(worker_id, job_id = %id, error = %e, "Job ended with error");
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Queue error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    pub async fn process_job(&self, id: JobId, worker_id: usize) -> Result<(), PipelineError> {
        tracing::info!(worker_id, job_id = %id, "Processing job");
        let token = self.registry.register(id);
        let pipeline = self.pipeline.clone();
        let handle = tokio::spawn(async move { pipeline.run(id, &token).await });
        let outcome = handle.await;
        self.registry.remove(id);

        match outcome {
            Ok(result) => result,
            Err(join_error) => {
                tracing::error!(worker_id, job_id = %id, error = %join_error, "Job task aborted");
                let error = PipelineError::Internal("job processing aborted unexpectedly".to_string());
                self.pipeline.record_failure(id, &error).await;
                self.pipeline.release_source_if_finished(id).await;
                Err(error)
            }
        }
    }
}
