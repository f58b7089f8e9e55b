use crate::application::error::PipelineError;
use crate::config::PipelineConfig;
use crate::domain::events::JobEvent;
use crate::domain::jobs::{FailureKind, Job, JobId, JobStage, SourceRef};
use crate::domain::validation::{
    resolve_options, validate_upload, OptionOverrides, UploadLimits, UploadMetadata,
};
use crate::ports::events::JobEventSink;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use std::sync::Arc;
use tempfile::TempPath;

/// A client upload already written to a local temporary file.
#[derive(Debug)]
pub struct UploadRequest {
    pub file: TempPath,
    pub file_name: String,
    pub declared_type: Option<String>,
    pub size_bytes: u64,
    pub overrides: OptionOverrides,
}

pub fn staging_key(job_id: JobId, extension: &str) -> String {
    format!("staging/{}/source.{}", job_id, extension)
}

/// Upload intake: validates, stages, creates the job and hands it to the
/// worker pool.
pub struct IntakeService {
    storage: Arc<dyn StoragePort>,
    repo: Arc<dyn JobRepository>,
    queue: Arc<dyn JobQueuePort>,
    events: Arc<dyn JobEventSink>,
    config: Arc<PipelineConfig>,
}

impl IntakeService {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        repo: Arc<dyn JobRepository>,
        queue: Arc<dyn JobQueuePort>,
        events: Arc<dyn JobEventSink>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            storage,
            repo,
            queue,
            events,
            config,
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.config.limits
    }

    pub async fn accept(&self, upload: UploadRequest) -> Result<Job, PipelineError> {
        let validated = validate_upload(
            &UploadMetadata {
                file_name: upload.file_name.clone(),
                declared_type: upload.declared_type.clone(),
                size_bytes: upload.size_bytes,
            },
            &self.config.limits,
        )?;
        let options = resolve_options(
            &self.config.default_options,
            &self.config.allowed_models,
            upload.overrides,
        )?;

        let job_id = JobId::new();
        let key = staging_key(job_id, &validated.extension);

        // 1. Stage the source
        self.storage
            .upload(&upload.file, &key, &validated.content_type)
            .await?;

        // 2. Create the job
        let job = Job::new(
            job_id,
            SourceRef {
                key: key.clone(),
                file_name: validated.file_name,
                content_type: validated.content_type,
                size_bytes: upload.size_bytes,
            },
            options,
        );
        if let Err(e) = self.repo.insert(&job).await {
            if let Err(cleanup) = self.storage.delete(&key).await {
                tracing::warn!(job_id = %job_id, error = %cleanup, "Failed to remove staged file");
            }
            return Err(e.into());
        }
        self.events.publish(JobEvent::from_job(&job));

        // 3. Enqueue
        if let Err(e) = self.queue.enqueue_job(job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to enqueue job");
            let mut failed = job.clone();
            failed.fail(FailureKind::Internal, "job could not be queued for processing")?;
            if self.repo.save_if(&failed, JobStage::Uploaded).await? {
                self.events.publish(JobEvent::from_job(&failed));
            }
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job_id,
            key = %key,
            size_bytes = upload.size_bytes,
            model = %job.options.model,
            "Accepted upload"
        );
        Ok(job)
    }
}
