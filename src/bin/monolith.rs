//! Monolith Binary - single-process deployment
//!
//! Wires up:
//! - Local adapters (filesystem storage, Redis or in-memory jobs and queue)
//! - Remote moderation classifier and RunwayML generation
//! - The job HTTP API, plus artifacts and staged sources under `/files`
//! - A pool of pipeline workers

use anyhow::Context;
use axum::Router;
use std::sync::Arc;
use videogen::adapters::http::{self, AppState};
use videogen::adapters::local::{FsAdapter, InMemoryJobRepository, InMemoryQueue, RedisPool};
use videogen::adapters::remote::{HttpClassifier, HttpDecisionFunction, RunwayClient};
use videogen::adapters::EventHub;
use videogen::application::cancellation::{CancellationRegistry, CancellationService};
use videogen::application::dispatcher::TransformationDispatcher;
use videogen::application::intake::IntakeService;
use videogen::application::moderation::ModerationGate;
use videogen::application::publisher::ResultPublisher;
use videogen::application::status::StatusReporter;
use videogen::application::worker::{JobPipeline, WorkerService};
use videogen::config::{ConfigError, LocalConfig, ModerationConfig, PipelineConfig, RunwayConfig};
use videogen::domain::policy::ThresholdPolicy;
use videogen::ports::moderation::ModerationDecider;
use videogen::ports::queue::JobQueuePort;
use videogen::ports::repository::JobRepository;
use videogen::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = LocalConfig::from_env()?;
    let pipeline_config = Arc::new(PipelineConfig::from_env()?);
    let moderation = ModerationConfig::from_env()?;
    let runway = RunwayConfig::from_env()?;

    // 1. Adapters
    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("creating storage dir {}", config.storage_dir))?;
    let storage = Arc::new(FsAdapter::new(&config.storage_dir, &config.public_base_url));

    let repo: Arc<dyn JobRepository>;
    let queue: Arc<dyn JobQueuePort>;
    match &config.redis_url {
        Some(url) => {
            let pool = Arc::new(RedisPool::new(url).context("creating Redis pool")?);
            tracing::info!("Job state and queue in Redis");
            repo = pool.clone();
            queue = pool;
        }
        None => {
            tracing::warn!("REDIS_URL not set, job state is kept in memory");
            repo = Arc::new(InMemoryJobRepository::new());
            queue = Arc::new(InMemoryQueue::new());
        }
    }

    let classifier_url = moderation
        .classifier_url
        .clone()
        .ok_or(ConfigError::Missing("MODERATION_CLASSIFIER_URL"))?;
    let classifier = Arc::new(HttpClassifier::new(classifier_url)?);
    let decider: Arc<dyn ModerationDecider> = match &moderation.decision_url {
        Some(url) => Arc::new(HttpDecisionFunction::new(url.clone())?),
        None => Arc::new(ThresholdPolicy::new(
            moderation.blocked_categories.clone(),
            moderation.min_confidence,
        )),
    };
    let generation = Arc::new(RunwayClient::new(runway)?);
    let hub = Arc::new(EventHub::new());
    let registry = Arc::new(CancellationRegistry::new());

    // 2. Application services
    let pipeline = Arc::new(JobPipeline::new(
        repo.clone(),
        hub.clone(),
        ModerationGate::new(classifier, decider, storage.clone(), pipeline_config.clone()),
        TransformationDispatcher::new(generation, storage.clone(), pipeline_config.clone()),
        ResultPublisher::new(storage.clone()),
        pipeline_config.clone(),
    ));
    let workers = Arc::new(WorkerService::new(queue.clone(), pipeline, registry.clone()));

    let state = AppState {
        intake: Arc::new(IntakeService::new(
            storage.clone(),
            repo.clone(),
            queue,
            hub.clone(),
            pipeline_config.clone(),
        )),
        status: Arc::new(StatusReporter::new(repo.clone())),
        cancellation: Arc::new(CancellationService::new(repo, hub.clone(), registry)),
        hub,
    };

    // 3. Start workers
    for i in 0..pipeline_config.worker_count {
        let w = workers.clone();
        tokio::spawn(async move {
            w.run_worker_loop(i).await;
        });
    }
    tracing::info!(workers = pipeline_config.worker_count, "Started pipeline workers");

    // 4. HTTP layer
    let app = Router::new()
        .merge(http::router(state))
        .merge(http::files_router(storage.root()));

    let addr = config.http.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(addr = %addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    Ok(())
}
