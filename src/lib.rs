//! Videogen - moderated AI video-to-video pipeline
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, validation, moderation policy, events)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations
//! - application/: Pipeline services (intake, moderation, dispatch, publishing, status)
//! - config: Environment configuration
//!
//! # Features
//! - `local`: Monolith deployment (filesystem storage, in-memory or Redis jobs and queue)
//! - `aws`: AWS deployment (S3, SQS, DynamoDB, Rekognition)
//! - `full`: All features

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use application::PipelineError;

#[cfg(feature = "aws")]
pub use config::AwsConfig;

#[cfg(feature = "local")]
pub use config::LocalConfig;
