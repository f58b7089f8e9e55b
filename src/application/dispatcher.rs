use crate::application::error::PipelineError;
use crate::config::PipelineConfig;
use crate::domain::jobs::{Job, JobId};
use crate::ports::generation::{GenerationError, GenerationInput, GenerationService, RemoteTaskState};
use crate::ports::storage::StoragePort;
use std::sync::Arc;
use tempfile::TempPath;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const FALLBACK_OUTPUT_TYPE: &str = "video/mp4";
const FALLBACK_OUTPUT_EXTENSION: &str = "mp4";

/// A submitted remote task. Holds a generation slot until dropped.
#[derive(Debug)]
pub struct Submission {
    pub task_id: String,
    pub deadline: Instant,
    _slot: OwnedSemaphorePermit,
}

/// Generation output downloaded to a local temporary file. The file is
/// removed when this value is dropped, so an artifact that is never
/// published leaves nothing behind.
#[derive(Debug)]
pub struct GeneratedArtifact {
    pub file: TempPath,
    pub size_bytes: u64,
    pub content_type: String,
    pub extension: String,
    pub remote_task_id: String,
    pub output_uri: String,
}

pub struct TransformationDispatcher {
    generation: Arc<dyn GenerationService>,
    storage: Arc<dyn StoragePort>,
    config: Arc<PipelineConfig>,
    slots: Arc<Semaphore>,
}

impl TransformationDispatcher {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        storage: Arc<dyn StoragePort>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_generations.max(1)));
        Self {
            generation,
            storage,
            config,
            slots,
        }
    }

    /// Waits for a generation slot and submits the staged source. The
    /// generation timeout starts counting here.
    pub async fn submit(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<Submission, PipelineError> {
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled(job.id)),
            slot = self.slots.clone().acquire_owned() => slot
                .map_err(|_| PipelineError::Internal("generation slots closed".to_string()))?,
        };

        let video_uri = self
            .storage
            .share_url(&job.source.key, self.config.share_url_ttl)
            .await?;
        let input = GenerationInput {
            job_id: job.id,
            video_uri,
            options: job.options.clone(),
        };

        let task_id = self
            .generation
            .submit(&input)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        if task_id.trim().is_empty() {
            return Err(PipelineError::Generation(
                "generation service returned an empty task id".to_string(),
            ));
        }

        tracing::info!(job_id = %job.id, task_id = %task_id, model = %job.options.model, "Submitted generation task");
        Ok(Submission {
            task_id,
            deadline: Instant::now() + self.config.generation_timeout,
            _slot: slot,
        })
    }

    /// Polls the remote task until it finishes, the deadline passes or the
    /// job is cancelled. In the latter two cases the remote task is
    /// cancelled as well.
    pub async fn await_output(
        &self,
        job_id: JobId,
        submission: Submission,
        cancel: &CancellationToken,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let task_id = submission.task_id.as_str();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled(job_id)),
            result = tokio::time::timeout_at(submission.deadline, self.poll_until_done(job_id, task_id)) => {
                result.unwrap_or(Err(PipelineError::GenerationTimeout(self.config.generation_timeout)))
            }
        };

        if let Err(e @ (PipelineError::Cancelled(_) | PipelineError::GenerationTimeout(_))) = &outcome {
            tracing::warn!(job_id = %job_id, task_id, error = %e, "Abandoning generation task");
            if let Err(cancel_err) = self.generation.cancel(task_id).await {
                tracing::warn!(job_id = %job_id, task_id, error = %cancel_err, "Remote cancel failed");
            }
        }
        outcome
    }

    /// Gives up on a submitted task without waiting for it.
    pub async fn abandon(&self, job_id: JobId, submission: Submission) {
        if let Err(e) = self.generation.cancel(&submission.task_id).await {
            tracing::warn!(job_id = %job_id, task_id = %submission.task_id, error = %e, "Remote cancel failed");
        }
    }

    async fn poll_until_done(
        &self,
        job_id: JobId,
        task_id: &str,
    ) -> Result<GeneratedArtifact, PipelineError> {
        let mut ticker = tokio::time::interval(self.config.generation_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.generation.poll(task_id).await {
                Ok(RemoteTaskState::Pending) => {
                    tracing::debug!(job_id = %job_id, task_id, "Generation pending");
                }
                Ok(RemoteTaskState::Running { progress }) => {
                    tracing::debug!(job_id = %job_id, task_id, ?progress, "Generation running");
                }
                Ok(RemoteTaskState::Succeeded { outputs }) => {
                    return self.download(job_id, task_id, &outputs).await;
                }
                Ok(RemoteTaskState::Failed { reason }) => {
                    return Err(PipelineError::Generation(reason));
                }
                Ok(RemoteTaskState::Cancelled) => {
                    return Err(PipelineError::Generation(
                        "remote task was cancelled".to_string(),
                    ));
                }
                Err(GenerationError::Unavailable(reason)) => {
                    tracing::warn!(job_id = %job_id, task_id, %reason, "Poll failed, retrying");
                }
                Err(e) => return Err(PipelineError::Generation(e.to_string())),
            }
        }
    }

    async fn download(
        &self,
        job_id: JobId,
        task_id: &str,
        outputs: &[String],
    ) -> Result<GeneratedArtifact, PipelineError> {
        let output_uri = outputs.first().ok_or_else(|| {
            PipelineError::Generation("task succeeded without an output".to_string())
        })?;
        let (content_type, extension) = output_type(output_uri)?;

        let file = tempfile::Builder::new()
            .prefix("videogen-")
            .suffix(&format!(".{}", extension))
            .tempfile()
            .map_err(|e| PipelineError::Internal(format!("temporary file: {}", e)))?
            .into_temp_path();

        let size_bytes = self
            .generation
            .fetch_output(output_uri, &file)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        if size_bytes == 0 {
            return Err(PipelineError::Generation("output is empty".to_string()));
        }

        tracing::info!(job_id = %job_id, task_id, size_bytes, "Downloaded generation output");
        Ok(GeneratedArtifact {
            file,
            size_bytes,
            content_type,
            extension,
            remote_task_id: task_id.to_string(),
            output_uri: output_uri.clone(),
        })
    }
}

/// Output URLs come from the remote service: only absolute http(s) URLs are
/// followed. Anything that does not look like a video is stored as mp4.
fn output_type(uri: &str) -> Result<(String, String), PipelineError> {
    let url = reqwest::Url::parse(uri)
        .map_err(|e| PipelineError::Generation(format!("invalid output url '{}': {}", uri, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::Generation(format!(
            "unsupported output url scheme '{}'",
            url.scheme()
        )));
    }

    let path = std::path::Path::new(url.path());
    let guessed = mime_guess::from_path(path).first();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match (guessed, extension) {
        (Some(mime), Some(ext)) if mime.type_() == mime_guess::mime::VIDEO => {
            Ok((mime.essence_str().to_string(), ext))
        }
        _ => Ok((
            FALLBACK_OUTPUT_TYPE.to_string(),
            FALLBACK_OUTPUT_EXTENSION.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::SourceRef;
    use crate::ports::generation::MockGenerationService;
    use crate::ports::storage::MockStoragePort;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn job() -> Job {
        Job::new(
            JobId::new(),
            SourceRef {
                key: "staging/1/source.mp4".to_string(),
                file_name: "clip.mp4".to_string(),
                content_type: "video/mp4".to_string(),
                size_bytes: 5 * 1024 * 1024,
            },
            PipelineConfig::default().default_options,
        )
    }

    fn storage() -> Arc<MockStoragePort> {
        let mut storage = MockStoragePort::new();
        storage
            .expect_share_url()
            .returning(|key, _| Ok(format!("https://files.local/{}?sig=abc", key)));
        Arc::new(storage)
    }

    fn config() -> Arc<PipelineConfig> {
        let mut config = PipelineConfig::default();
        config.generation_poll_interval = Duration::from_secs(5);
        config.generation_timeout = Duration::from_secs(60);
        Arc::new(config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_generation_is_downloaded() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();

        let mut generation = MockGenerationService::new();
        generation
            .expect_submit()
            .withf(|input| input.video_uri.starts_with("https://files.local/staging/1/source.mp4"))
            .times(1)
            .returning(|_| Ok("task-1".to_string()));
        generation.expect_poll().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(RemoteTaskState::Running { progress: Some(0.5) })
            } else {
                Ok(RemoteTaskState::Succeeded {
                    outputs: vec!["https://cdn.example.com/out/abc.mp4?token=1".to_string()],
                })
            }
        });
        generation.expect_fetch_output().times(1).returning(|_, dest| {
            std::fs::write(dest, b"generated video").unwrap();
            Ok(15)
        });
        generation.expect_cancel().never();

        let dispatcher = TransformationDispatcher::new(Arc::new(generation), storage(), config());
        let job = job();
        let token = CancellationToken::new();
        let submission = dispatcher.submit(&job, &token).await.unwrap();
        let artifact = dispatcher.await_output(job.id, submission, &token).await.unwrap();

        assert_eq!(artifact.size_bytes, 15);
        assert_eq!(artifact.content_type, "video/mp4");
        assert_eq!(artifact.extension, "mp4");
        assert_eq!(artifact.remote_task_id, "task-1");
        assert_eq!(std::fs::read(&artifact.file).unwrap(), b"generated video");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_remote_task() {
        let mut generation = MockGenerationService::new();
        generation
            .expect_submit()
            .returning(|_| Ok("task-slow".to_string()));
        generation
            .expect_poll()
            .returning(|_| Ok(RemoteTaskState::Running { progress: None }));
        generation
            .expect_cancel()
            .withf(|task_id| task_id == "task-slow")
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = TransformationDispatcher::new(Arc::new(generation), storage(), config());
        let job = job();
        let token = CancellationToken::new();
        let submission = dispatcher.submit(&job, &token).await.unwrap();
        let err = dispatcher.await_output(job.id, submission, &token).await.unwrap_err();

        assert!(matches!(err, PipelineError::GenerationTimeout(d) if d == Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_a_generation_error() {
        let mut generation = MockGenerationService::new();
        generation.expect_submit().returning(|_| Ok("task-2".to_string()));
        generation.expect_poll().returning(|_| {
            Ok(RemoteTaskState::Failed {
                reason: "input video rejected".to_string(),
            })
        });
        generation.expect_cancel().never();

        let dispatcher = TransformationDispatcher::new(Arc::new(generation), storage(), config());
        let job = job();
        let token = CancellationToken::new();
        let submission = dispatcher.submit(&job, &token).await.unwrap();
        let err = dispatcher.await_output(job.id, submission, &token).await.unwrap_err();

        assert!(matches!(err, PipelineError::Generation(reason) if reason == "input video rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let mut generation = MockGenerationService::new();
        generation.expect_submit().returning(|_| Ok("task-3".to_string()));
        generation
            .expect_poll()
            .returning(|_| Ok(RemoteTaskState::Pending));
        generation.expect_cancel().times(1).returning(|_| Ok(()));

        let dispatcher = TransformationDispatcher::new(Arc::new(generation), storage(), config());
        let job = job();
        let token = CancellationToken::new();
        let submission = dispatcher.submit(&job, &token).await.unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            canceller.cancel();
        });

        let err = dispatcher.await_output(job.id, submission, &token).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(id) if id == job.id));
    }

    #[tokio::test]
    async fn test_cancelled_job_is_never_submitted() {
        let mut generation = MockGenerationService::new();
        generation.expect_submit().never();

        let dispatcher = TransformationDispatcher::new(
            Arc::new(generation),
            Arc::new(MockStoragePort::new()),
            config(),
        );
        let token = CancellationToken::new();
        token.cancel();

        let err = dispatcher.submit(&job(), &token).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_empty_download_is_rejected() {
        let mut generation = MockGenerationService::new();
        generation.expect_submit().returning(|_| Ok("task-4".to_string()));
        generation.expect_poll().returning(|_| {
            Ok(RemoteTaskState::Succeeded {
                outputs: vec!["https://cdn.example.com/out.mp4".to_string()],
            })
        });
        generation.expect_fetch_output().returning(|_, _| Ok(0));

        let dispatcher = TransformationDispatcher::new(Arc::new(generation), storage(), config());
        let job = job();
        let token = CancellationToken::new();
        let submission = dispatcher.submit(&job, &token).await.unwrap();
        let err = dispatcher.await_output(job.id, submission, &token).await.unwrap_err();

        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[test]
    fn test_output_type() {
        assert_eq!(
            output_type("https://cdn.example.com/a/b.webm").unwrap(),
            ("video/webm".to_string(), "webm".to_string())
        );
        assert_eq!(
            output_type("https://cdn.example.com/task/output").unwrap(),
            ("video/mp4".to_string(), "mp4".to_string())
        );
        assert!(output_type("file:///etc/passwd").is_err());
        assert!(output_type("not a url").is_err());
    }
}
