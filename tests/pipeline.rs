//! End-to-end job scenarios on the in-memory and filesystem adapters with
//! scripted moderation and generation services.
#![cfg(feature = "local")]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::sync::Notify;
use videogen::adapters::local::{FsAdapter, InMemoryJobRepository, InMemoryQueue};
use videogen::adapters::EventHub;
use videogen::application::cancellation::{CancellationRegistry, CancellationService};
use videogen::application::dispatcher::TransformationDispatcher;
use videogen::application::intake::{IntakeService, UploadRequest};
use videogen::application::moderation::ModerationGate;
use videogen::application::publisher::{artifact_key, ResultPublisher};
use videogen::application::status::StatusReporter;
use videogen::application::worker::{JobPipeline, WorkerService};
use videogen::config::PipelineConfig;
use videogen::domain::jobs::{FailureKind, Job, JobId, JobStage, ModerationLabel};
use videogen::domain::policy::ThresholdPolicy;
use videogen::domain::validation::{OptionOverrides, ValidationError};
use videogen::ports::generation::{
    GenerationError, GenerationInput, GenerationService, RemoteTaskState,
};
use videogen::ports::moderation::{ClassifierError, ContentClassifier, StagedSource};
use videogen::ports::queue::JobQueuePort;
use videogen::ports::repository::{JobRepository, RepositoryError};
use videogen::PipelineError;

const OUTPUT_URI: &str = "https://runway.example/outputs/result.mp4";
const OUTPUT_BYTES: usize = 2048;

struct ScriptedClassifier {
    labels: Vec<ModerationLabel>,
}

#[async_trait]
impl ContentClassifier for ScriptedClassifier {
    async fn classify(&self, _staged: &StagedSource) -> Result<Vec<ModerationLabel>, ClassifierError> {
        Ok(self.labels.clone())
    }
}

enum Script {
    /// Succeeds on the second poll
    Succeed,
    /// Runs until released, then succeeds
    SucceedWhenReleased,
    /// Never finishes
    Hang,
}

struct ScriptedGeneration {
    script: Script,
    submitted: Notify,
    submissions: AtomicUsize,
    polls: AtomicUsize,
    cancellations: AtomicUsize,
    released: AtomicBool,
}

impl ScriptedGeneration {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            submitted: Notify::new(),
            submissions: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        })
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationService for ScriptedGeneration {
    async fn submit(&self, input: &GenerationInput) -> Result<String, GenerationError> {
        assert!(input.video_uri.starts_with("http://localhost/files/staging/"));
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.submitted.notify_one();
        Ok(format!("task-{}", input.job_id))
    }

    async fn poll(&self, _task_id: &str) -> Result<RemoteTaskState, GenerationError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let done = match self.script {
            Script::Succeed => polls >= 2,
            Script::SucceedWhenReleased => self.released.load(Ordering::SeqCst),
            Script::Hang => false,
        };
        if done {
            Ok(RemoteTaskState::Succeeded {
                outputs: vec![OUTPUT_URI.to_string()],
            })
        } else {
            Ok(RemoteTaskState::Running { progress: Some(0.5) })
        }
    }

    async fn cancel(&self, _task_id: &str) -> Result<(), GenerationError> {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_output(&self, output_uri: &str, dest: &Path) -> Result<u64, GenerationError> {
        assert_eq!(output_uri, OUTPUT_URI);
        tokio::fs::write(dest, vec![42u8; OUTPUT_BYTES]).await?;
        Ok(OUTPUT_BYTES as u64)
    }
}

/// Cancels the job right before the worker stores its completion, as a
/// client in another process would.
struct CancelBeforeCompletion {
    inner: InMemoryJobRepository,
}

#[async_trait]
impl JobRepository for CancelBeforeCompletion {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        self.inner.insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn save_if(&self, job: &Job, expected: JobStage) -> Result<bool, RepositoryError> {
        if job.stage == JobStage::Completed {
            let mut cancelled = self.inner.get(job.id).await?.unwrap();
            cancelled.cancel().unwrap();
            assert!(self.inner.save_if(&cancelled, expected).await?);
        }
        self.inner.save_if(job, expected).await
    }
}

struct Harness {
    root: TempDir,
    intake: IntakeService,
    status: StatusReporter,
    cancellation: CancellationService,
    workers: WorkerService,
    queue: Arc<InMemoryQueue>,
    generation: Arc<ScriptedGeneration>,
}

fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.limits.max_bytes = 8 * 1024 * 1024;
    config.moderation_backoff = Duration::from_millis(10);
    config.generation_poll_interval = Duration::from_millis(20);
    config.generation_timeout = Duration::from_secs(30);
    config
}

fn harness(labels: Vec<ModerationLabel>, script: Script, config: PipelineConfig) -> Harness {
    harness_with_repo(labels, script, config, Arc::new(InMemoryJobRepository::new()))
}

fn harness_with_repo(
    labels: Vec<ModerationLabel>,
    script: Script,
    config: PipelineConfig,
    repo: Arc<dyn JobRepository>,
) -> Harness {
    let root = TempDir::new().unwrap();
    let config = Arc::new(config);
    let storage = Arc::new(FsAdapter::new(root.path(), "http://localhost/files"));
    let queue = Arc::new(InMemoryQueue::new());
    let hub = Arc::new(EventHub::new());
    let registry = Arc::new(CancellationRegistry::new());
    let generation = ScriptedGeneration::new(script);

    let pipeline = Arc::new(JobPipeline::new(
        repo.clone(),
        hub.clone(),
        ModerationGate::new(
            Arc::new(ScriptedClassifier { labels }),
            Arc::new(ThresholdPolicy::new(Vec::new(), 80.0)),
            storage.clone(),
            config.clone(),
        ),
        TransformationDispatcher::new(generation.clone(), storage.clone(), config.clone()),
        ResultPublisher::new(storage.clone()),
        config.clone(),
    ));

    Harness {
        intake: IntakeService::new(storage, repo.clone(), queue.clone(), hub.clone(), config),
        status: StatusReporter::new(repo.clone()),
        cancellation: CancellationService::new(repo, hub.clone(), registry.clone()),
        workers: WorkerService::new(queue.clone(), pipeline, registry),
        root,
        queue,
        generation,
    }
}

fn clip(size: usize) -> UploadRequest {
    let file = NamedTempFile::new().unwrap();
    std::fs::write(file.path(), vec![7u8; size]).unwrap();
    UploadRequest {
        file: file.into_temp_path(),
        file_name: "clip.mp4".to_string(),
        declared_type: Some("video/mp4".to_string()),
        size_bytes: size as u64,
        overrides: OptionOverrides::default(),
    }
}

fn label(name: &str, confidence: f32) -> ModerationLabel {
    ModerationLabel {
        name: name.to_string(),
        parent: None,
        confidence,
    }
}

impl Harness {
    async fn submit(&self, size: usize) -> JobId {
        let job = self.intake.accept(clip(size)).await.unwrap();
        let queued = self.queue.dequeue_job(Duration::from_millis(10)).await.unwrap();
        assert_eq!(queued, Some(job.id));
        job.id
    }

    fn artifact_path(&self, id: JobId) -> std::path::PathBuf {
        self.root.path().join(artifact_key(id, "mp4"))
    }

    fn source_path(&self, id: JobId) -> std::path::PathBuf {
        self.root.path().join(format!("staging/{}/source.mp4", id))
    }
}

#[tokio::test]
async fn test_approved_clip_completes_with_retrievable_artifact() {
    let h = harness(vec![label("Smoking", 40.0)], Script::Succeed, config());
    let id = h.submit(5 * 1024 * 1024).await;

    h.workers.process_job(id, 0).await.unwrap();

    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.stage, JobStage::Completed);
    let url = view.result_url.clone().unwrap();
    let key = artifact_key(id, "mp4");
    assert!(url.ends_with(&key), "{url} should end with {key}");
    assert_eq!(
        std::fs::metadata(h.artifact_path(id)).unwrap().len(),
        OUTPUT_BYTES as u64
    );
    assert_eq!(h.generation.submissions.load(Ordering::SeqCst), 1);
    assert_eq!(h.generation.cancellations.load(Ordering::SeqCst), 0);
    assert!(!h.source_path(id).exists());

    // Terminal status is stable
    assert_eq!(h.status.status(id).await.unwrap(), view);
    assert_eq!(h.status.status(id).await.unwrap(), view);
}

#[tokio::test]
async fn test_flagged_clip_is_rejected_without_generation() {
    let h = harness(vec![label("Violence", 97.0)], Script::Succeed, config());
    let id = h.submit(1024).await;
    assert!(h.source_path(id).exists());

    h.workers.process_job(id, 0).await.unwrap();

    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.stage, JobStage::Rejected);
    assert!(!h.source_path(id).exists());
    assert!(view.reason.unwrap().contains("Violence"));
    assert_eq!(view.flagged_categories, vec!["Violence".to_string()]);
    assert_eq!(view.result_url, None);
    assert_eq!(h.generation.submissions.load(Ordering::SeqCst), 0);
    assert!(!h.root.path().join("artifacts").exists());
}

#[tokio::test(start_paused = true)]
async fn test_generation_timeout_fails_without_artifact() {
    let mut config = config();
    config.generation_poll_interval = Duration::from_secs(5);
    config.generation_timeout = Duration::from_secs(60);
    let h = harness(Vec::new(), Script::Hang, config);
    let id = h.submit(1024).await;

    let err = h.workers.process_job(id, 0).await.unwrap_err();
    assert!(matches!(err, PipelineError::GenerationTimeout(_)));

    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.stage, JobStage::Failed);
    assert_eq!(view.failure_kind, Some(FailureKind::GenerationTimeout));
    assert_eq!(h.generation.cancellations.load(Ordering::SeqCst), 1);
    assert!(!h.artifact_path(id).exists());
    assert!(!h.source_path(id).exists());
}

#[tokio::test]
async fn test_cancel_after_generation_starts_discards_late_result() {
    let h = harness(Vec::new(), Script::SucceedWhenReleased, config());
    let id = h.submit(1024).await;

    let worker = h.workers.process_job(id, 0);
    let client = async {
        h.generation.submitted.notified().await;
        let cancelled = h.cancellation.cancel(id).await.unwrap();
        assert_eq!(cancelled.stage, JobStage::Failed);
        // The remote task finishes anyway
        h.generation.release();
    };
    let (outcome, ()) = tokio::join!(worker, client);

    assert!(matches!(outcome, Err(PipelineError::Cancelled(_))));
    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.stage, JobStage::Failed);
    assert_eq!(view.failure_kind, Some(FailureKind::Cancelled));
    assert_eq!(view.result_url, None);
    assert_eq!(h.generation.cancellations.load(Ordering::SeqCst), 1);
    assert!(!h.artifact_path(id).exists());
}

#[tokio::test]
async fn test_size_limit_is_inclusive() {
    let mut config = config();
    config.limits.max_bytes = 4096;
    let h = harness(Vec::new(), Script::Succeed, config);

    let accepted = h.intake.accept(clip(4096)).await.unwrap();
    assert_eq!(accepted.stage, JobStage::Uploaded);

    let err = h.intake.accept(clip(4097)).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::TooLarge { size: 4097, max: 4096 })
    ));
}

#[tokio::test]
async fn test_cancelled_before_pickup_is_skipped() {
    let h = harness(Vec::new(), Script::Succeed, config());
    let id = h.submit(1024).await;

    h.cancellation.cancel(id).await.unwrap();
    h.workers.process_job(id, 0).await.unwrap();

    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.failure_kind, Some(FailureKind::Cancelled));
    assert_eq!(h.generation.submissions.load(Ordering::SeqCst), 0);
    assert!(!h.source_path(id).exists());
}

#[tokio::test]
async fn test_cancel_during_publication_retracts_artifact() {
    let repo = Arc::new(CancelBeforeCompletion {
        inner: InMemoryJobRepository::new(),
    });
    let h = harness_with_repo(Vec::new(), Script::Succeed, config(), repo);
    let id = h.submit(1024).await;

    let err = h.workers.process_job(id, 0).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled(cancelled) if cancelled == id));

    let view = h.status.status(id).await.unwrap();
    assert_eq!(view.stage, JobStage::Failed);
    assert_eq!(view.failure_kind, Some(FailureKind::Cancelled));
    assert_eq!(view.result_url, None);
    // Published, then removed once the completion write lost
    assert_eq!(h.generation.polls.load(Ordering::SeqCst), 2);
    assert!(!h.artifact_path(id).exists());
    assert!(!h.source_path(id).exists());
}
