//! RunwayML video-to-video client.

use crate::adapters::stream::{stream_to_file, StreamError};
use crate::config::RunwayConfig;
use crate::domain::jobs::PublicFigureThreshold;
use crate::ports::generation::{GenerationError, GenerationInput, GenerationService, RemoteTaskState};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoToVideoRequest<'a> {
    model: &'a str,
    video_uri: &'a str,
    prompt_text: &'a str,
    ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    references: Vec<Reference<'a>>,
    content_moderation: ContentModeration,
}

#[derive(Debug, Serialize)]
struct Reference<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentModeration {
    public_figure_threshold: PublicFigureThreshold,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    status: String,
    #[serde(default)]
    progress: Option<f32>,
    #[serde(default)]
    output: Option<Vec<String>>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

impl Task {
    fn into_state(self) -> Result<RemoteTaskState, GenerationError> {
        match self.status.as_str() {
            "PENDING" | "THROTTLED" => Ok(RemoteTaskState::Pending),
            "RUNNING" => Ok(RemoteTaskState::Running {
                progress: self.progress,
            }),
            "SUCCEEDED" => Ok(RemoteTaskState::Succeeded {
                outputs: self.output.unwrap_or_default(),
            }),
            "FAILED" => Ok(RemoteTaskState::Failed {
                reason: self
                    .failure
                    .or(self.failure_code)
                    .unwrap_or_else(|| "generation failed".to_string()),
            }),
            "CANCELLED" => Ok(RemoteTaskState::Cancelled),
            other => Err(GenerationError::InvalidResponse(format!(
                "unknown task status '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct RunwayClient {
    http: reqwest::Client,
    config: RunwayConfig,
}

impl RunwayClient {
    pub fn new(config: RunwayConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn api(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .bearer_auth(&self.config.api_secret)
            .header("X-Runway-Version", &self.config.api_version)
            .timeout(API_TIMEOUT)
    }
}

/// Task ids end up in request paths, so anything beyond the UUID alphabet
/// is refused.
fn task_path(task_id: &str) -> Result<String, GenerationError> {
    let valid = !task_id.is_empty()
        && task_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(GenerationError::InvalidResponse(format!(
            "malformed task id '{}'",
            task_id.escape_default()
        )));
    }
    Ok(format!("/v1/tasks/{}", task_id))
}

fn unavailable(err: reqwest::Error) -> GenerationError {
    GenerationError::Unavailable(err.to_string())
}

/// Maps a non-success response onto the error it stands for.
async fn status_error(response: Response) -> GenerationError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} - {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GenerationError::Unavailable(detail)
    } else if status.is_client_error() {
        GenerationError::Rejected(detail)
    } else {
        GenerationError::InvalidResponse(detail)
    }
}

#[async_trait]
impl GenerationService for RunwayClient {
    async fn submit(&self, input: &GenerationInput) -> Result<String, GenerationError> {
        let options = &input.options;
        let body = VideoToVideoRequest {
            model: &options.model,
            video_uri: &input.video_uri,
            prompt_text: &options.prompt_text,
            ratio: &options.ratio,
            seed: options.seed,
            references: options
                .reference_image_uri
                .as_deref()
                .map(|uri| Reference { kind: "image", uri })
                .into_iter()
                .collect(),
            content_moderation: ContentModeration {
                public_figure_threshold: options.public_figure_threshold,
            },
        };

        let response = self
            .api(reqwest::Method::POST, "/v1/video_to_video")
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let created: CreatedTask = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        task_path(&created.id)?;
        Ok(created.id)
    }

    async fn poll(&self, task_id: &str) -> Result<RemoteTaskState, GenerationError> {
        let response = self
            .api(reqwest::Method::GET, &task_path(task_id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::InvalidResponse(format!(
                "task {} not found",
                task_id
            )));
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let task: Task = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        task.into_state()
    }

    async fn cancel(&self, task_id: &str) -> Result<(), GenerationError> {
        let response = self
            .api(reqwest::Method::DELETE, &task_path(task_id)?)
            .send()
            .await
            .map_err(unavailable)?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn fetch_output(&self, output_uri: &str, dest: &Path) -> Result<u64, GenerationError> {
        let response = self.http.get(output_uri).send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let expected = response.content_length();
        let received = stream_to_file(dest, response.bytes_stream(), None)
            .await
            .map_err(|e| match e {
                StreamError::Io(io) => GenerationError::Io(io),
                other => GenerationError::InvalidResponse(other.to_string()),
            })?;

        match expected {
            Some(expected) if expected != received => {
                Err(GenerationError::Incomplete { expected, received })
            }
            _ => Ok(received),
        }
    }
}
