//! Configuration for different deployment environments.
//!
//! Every section is read from environment variables; a `.env` file in the
//! working directory is honoured.

use crate::domain::jobs::{GenerationOptions, PublicFigureThreshold};
use crate::domain::validation::{validate_ratio, UploadLimits};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} env var required")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    var(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn list_or(name: &str, default: &[&str]) -> Vec<String> {
    match var(name) {
        Some(value) => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// HTTP server bind settings.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
}

impl HttpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            addr: var("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: parse_or("PORT", 3000)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

/// Limits, retry budgets and timeouts of the job pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub limits: UploadLimits,
    pub allowed_models: Vec<String>,
    pub default_options: GenerationOptions,
    /// Extra classification attempts after the first one
    pub moderation_retries: u32,
    /// Bound on a single classification + decision attempt
    pub moderation_timeout: Duration,
    /// Base delay between attempts, grows linearly
    pub moderation_backoff: Duration,
    pub generation_poll_interval: Duration,
    /// Bound on a generation task, measured from submission
    pub generation_timeout: Duration,
    /// Queue consumers per process
    pub worker_count: usize,
    pub max_concurrent_generations: usize,
    pub share_url_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: UploadLimits {
                max_bytes: 500 * 1024 * 1024,
                allowed_types: DEFAULT_VIDEO_TYPES.iter().map(|s| s.to_string()).collect(),
            },
            allowed_models: vec![String::from(DEFAULT_MODEL)],
            default_options: GenerationOptions {
                model: String::from(DEFAULT_MODEL),
                prompt_text: String::from(DEFAULT_PROMPT),
                ratio: String::from("1280:720"),
                seed: None,
                reference_image_uri: None,
                public_figure_threshold: PublicFigureThreshold::Auto,
            },
            moderation_retries: 2,
            moderation_timeout: Duration::from_secs(120),
            moderation_backoff: Duration::from_millis(500),
            generation_poll_interval: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(900),
            worker_count: 4,
            max_concurrent_generations: 2,
            share_url_ttl: Duration::from_secs(3600),
        }
    }
}

const DEFAULT_MODEL: &str = "gen4_aleph";
const DEFAULT_PROMPT: &str =
    "A cinematic style transformation with vibrant colors and smooth motion.";
const DEFAULT_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/webm",
    "video/x-matroska",
];

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let default_model = var("DEFAULT_MODEL").unwrap_or(defaults.default_options.model);
        let mut allowed_models = list_or("ALLOWED_MODELS", &[DEFAULT_MODEL]);
        if !allowed_models.contains(&default_model) {
            allowed_models.push(default_model.clone());
        }

        let ratio = var("DEFAULT_RATIO").unwrap_or(defaults.default_options.ratio);
        validate_ratio(&ratio).map_err(|e| ConfigError::Invalid {
            name: "DEFAULT_RATIO",
            value: ratio.clone(),
            reason: e.to_string(),
        })?;

        let worker_count: usize = parse_or("WORKER_COUNT", defaults.worker_count)?;
        if worker_count == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKER_COUNT",
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        Ok(Self {
            limits: UploadLimits {
                max_bytes: parse_or("MAX_UPLOAD_BYTES", defaults.limits.max_bytes)?,
                allowed_types: list_or("ALLOWED_VIDEO_TYPES", DEFAULT_VIDEO_TYPES),
            },
            allowed_models,
            default_options: GenerationOptions {
                model: default_model,
                prompt_text: var("DEFAULT_PROMPT").unwrap_or(defaults.default_options.prompt_text),
                ratio,
                seed: None,
                reference_image_uri: var("DEFAULT_REFERENCE_IMAGE_URI"),
                public_figure_threshold: parse_or(
                    "PUBLIC_FIGURE_THRESHOLD",
                    PublicFigureThreshold::Auto,
                )?,
            },
            moderation_retries: parse_or("MODERATION_RETRIES", defaults.moderation_retries)?,
            moderation_timeout: Duration::from_secs(parse_or("MODERATION_TIMEOUT_SECS", 120)?),
            moderation_backoff: Duration::from_millis(parse_or("MODERATION_BACKOFF_MS", 500)?),
            generation_poll_interval: Duration::from_secs(parse_or(
                "GENERATION_POLL_INTERVAL_SECS",
                5,
            )?),
            generation_timeout: Duration::from_secs(parse_or("GENERATION_TIMEOUT_SECS", 900)?),
            worker_count,
            max_concurrent_generations: parse_or(
                "MAX_CONCURRENT_GENERATIONS",
                defaults.max_concurrent_generations,
            )?
            .max(1),
            share_url_ttl: Duration::from_secs(parse_or("SHARE_URL_TTL_SECS", 3600)?),
        })
    }
}

/// Moderation collaborators and the local policy.
#[derive(Clone, Debug)]
pub struct ModerationConfig {
    /// Categories the local policy blocks; empty blocks every label over the threshold
    pub blocked_categories: Vec<String>,
    pub min_confidence: f32,
    /// Remote decision function; the local policy is used when unset
    pub decision_url: Option<String>,
    /// Remote classifier endpoint (local deployment)
    pub classifier_url: Option<String>,
}

impl ModerationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            blocked_categories: list_or("MODERATION_BLOCKED_CATEGORIES", &[]),
            min_confidence: parse_or("MODERATION_MIN_CONFIDENCE", 70.0)?,
            decision_url: var("MODERATION_DECISION_URL"),
            classifier_url: var("MODERATION_CLASSIFIER_URL"),
        })
    }
}

/// RunwayML API access.
#[derive(Clone)]
pub struct RunwayConfig {
    pub api_secret: String,
    pub base_url: String,
    pub api_version: String,
}

impl std::fmt::Debug for RunwayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunwayConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl RunwayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            api_secret: required("RUNWAYML_API_SECRET")?,
            base_url: trim_base_url(
                var("RUNWAYML_BASE_URL")
                    .unwrap_or_else(|| String::from("https://api.dev.runwayml.com")),
            ),
            api_version: var("RUNWAYML_API_VERSION").unwrap_or_else(|| String::from("2024-11-06")),
        })
    }
}

/// Configuration for local/monolith deployment.
#[cfg(feature = "local")]
#[derive(Clone, Debug)]
pub struct LocalConfig {
    pub http: HttpConfig,
    /// Root directory for staged uploads and published artifacts
    pub storage_dir: String,
    /// Base URL under which `storage_dir` is served
    pub public_base_url: String,
    /// Redis connection URL; in-memory job state when unset
    pub redis_url: Option<String>,
}

#[cfg(feature = "local")]
impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let http = HttpConfig::from_env()?;
        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}/files", http.bind_address()));

        Ok(Self {
            http,
            storage_dir: var("STORAGE_DIR").unwrap_or_else(|| String::from("./storage")),
            public_base_url: trim_base_url(public_base_url),
            redis_url: var("REDIS_URL"),
        })
    }
}

/// Configuration for AWS deployment.
#[cfg(feature = "aws")]
#[derive(Clone, Debug)]
pub struct AwsConfig {
    pub http: HttpConfig,
    /// S3 bucket for staged uploads and artifacts
    pub s3_bucket: String,
    /// SQS queue URL for job messages
    pub sqs_queue_url: String,
    /// DynamoDB table name for job state
    pub dynamodb_table: String,
    /// Public base URL of the bucket (CDN or website endpoint)
    pub public_base_url: String,
}

#[cfg(feature = "aws")]
impl AwsConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            http: HttpConfig::from_env()?,
            s3_bucket: required("S3_BUCKET")?,
            sqs_queue_url: required("SQS_QUEUE_URL")?,
            dynamodb_table: required("DYNAMODB_TABLE")?,
            public_base_url: trim_base_url(required("PUBLIC_BASE_URL")?),
        })
    }
}
