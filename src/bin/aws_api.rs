//! AWS API Binary
//!
//! Serves the job HTTP API on top of S3, SQS and DynamoDB. Uploads are
//! staged in S3 and their jobs queued for `aws_worker` processes.
//!
//! Environment Variables:
//! - AWS_REGION: AWS region
//! - S3_BUCKET: S3 bucket for staged uploads and artifacts
//! - SQS_QUEUE_URL: SQS queue URL for jobs
//! - DYNAMODB_TABLE: DynamoDB table for job state
//! - PUBLIC_BASE_URL: public base URL of the bucket

use anyhow::Context;
use std::sync::Arc;
use videogen::adapters::aws::{DynamoAdapter, S3Adapter, SqsAdapter};
use videogen::adapters::http::{self, AppState};
use videogen::adapters::EventHub;
use videogen::application::cancellation::{CancellationRegistry, CancellationService};
use videogen::application::intake::IntakeService;
use videogen::application::status::StatusReporter;
use videogen::config::{AwsConfig, PipelineConfig};
use videogen::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AwsConfig::from_env()?;
    let pipeline_config = Arc::new(PipelineConfig::from_env()?);

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
    let hub = Arc::new(EventHub::new());

    // Workers run elsewhere and notice cancellation through the job table
    let state = AppState {
        intake: Arc::new(IntakeService::new(
            storage,
            repo.clone(),
            queue,
            hub.clone(),
            pipeline_config,
        )),
        status: Arc::new(StatusReporter::new(repo.clone())),
        cancellation: Arc::new(CancellationService::new(
            repo,
            hub.clone(),
            Arc::new(CancellationRegistry::new()),
        )),
        hub,
    };

    let addr = config.http.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(addr = %addr, bucket = %config.s3_bucket, "AWS API listening");
    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    Ok(())
}
