//! AWS Worker Binary
//!
//! Long-running consumer of the job queue (ECS task or Batch job) that:
//! 1. Connects to AWS services (S3, SQS, DynamoDB, Rekognition).
//! 2. Runs the job pipeline: moderation, RunwayML generation, publishing.
//!
//! Environment Variables:
//! - AWS_REGION: AWS region (e.g., us-east-1)
//! - S3_BUCKET: S3 bucket for staged uploads and artifacts
//! - SQS_QUEUE_URL: SQS queue URL for jobs
//! - DYNAMODB_TABLE: DynamoDB table for job state
//! - RUNWAYML_API_SECRET: RunwayML API key

use std::sync::Arc;
use std::time::Duration;
use videogen::adapters::aws::{DynamoAdapter, RekognitionClassifier, S3Adapter, SqsAdapter};
use videogen::adapters::remote::{HttpDecisionFunction, RunwayClient};
use videogen::adapters::EventHub;
use videogen::application::cancellation::CancellationRegistry;
use videogen::application::dispatcher::TransformationDispatcher;
use videogen::application::moderation::ModerationGate;
use videogen::application::publisher::ResultPublisher;
use videogen::application::worker::{JobPipeline, WorkerService};
use videogen::config::{AwsConfig, ModerationConfig, PipelineConfig, RunwayConfig};
use videogen::domain::policy::ThresholdPolicy;
use videogen::ports::moderation::ModerationDecider;
use videogen::telemetry::init_tracing;

const MODERATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AwsConfig::from_env()?;
    let pipeline_config = Arc::new(PipelineConfig::from_env()?);
    let moderation = ModerationConfig::from_env()?;
    let runway = RunwayConfig::from_env()?;

    // Load AWS config
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    // Create adapters
    let storage = Arc::new(S3Adapter::new(
        aws_sdk_s3::Client::new(&sdk_config),
        config.s3_bucket.clone(),
        config.public_base_url.clone(),
    ));
    let queue = Arc::new(SqsAdapter::new(
        aws_sdk_sqs::Client::new(&sdk_config),
        config.sqs_queue_url.clone(),
    ));
    let repo = Arc::new(DynamoAdapter::new(
        aws_sdk_dynamodb::Client::new(&sdk_config),
        config.dynamodb_table.clone(),
    ));
    let classifier = Arc::new(RekognitionClassifier::new(
        aws_sdk_rekognition::Client::new(&sdk_config),
        config.s3_bucket.clone(),
        moderation.min_confidence,
        MODERATION_POLL_INTERVAL,
    ));
    let decider: Arc<dyn ModerationDecider> = match &moderation.decision_url {
        Some(url) => Arc::new(HttpDecisionFunction::new(url.clone())?),
        None => Arc::new(ThresholdPolicy::new(
            moderation.blocked_categories.clone(),
            moderation.min_confidence,
        )),
    };
    let generation = Arc::new(RunwayClient::new(runway)?);

    // Create and run worker services
    let pipeline = Arc::new(JobPipeline::new(
        repo,
        Arc::new(EventHub::new()),
        ModerationGate::new(classifier, decider, storage.clone(), pipeline_config.clone()),
        TransformationDispatcher::new(generation, storage.clone(), pipeline_config.clone()),
        ResultPublisher::new(storage),
        pipeline_config.clone(),
    ));
    let workers = Arc::new(WorkerService::new(
        queue,
        pipeline,
        Arc::new(CancellationRegistry::new()),
    ));

    tracing::info!(
        workers = pipeline_config.worker_count,
        bucket = %config.s3_bucket,
        "AWS worker started, polling for jobs"
    );

    let mut loops = tokio::task::JoinSet::new();
    for i in 0..pipeline_config.worker_count {
        let w = workers.clone();
        loops.spawn(async move { w.run_worker_loop(i).await });
    }

    tokio::select! {
        _ = videogen::adapters::http::shutdown_signal() => {}
        _ = loops.join_next() => tracing::error!("A worker loop exited"),
    }
    Ok(())
}
