use super::error::ApiError;
use super::state::AppState;
use crate::adapters::stream::{stream_to_file, StreamError};
use crate::application::intake::UploadRequest;
use crate::domain::jobs::{JobId, JobStage};
use crate::domain::validation::{OptionOverrides, ValidationError};
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tempfile::{NamedTempFile, TempPath};

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub job_id: JobId,
    pub stage: JobStage,
}

struct ReceivedFile {
    path: TempPath,
    file_name: String,
    declared_type: Option<String>,
    size_bytes: u64,
}

/// `POST /jobs`: multipart form with a `file` part and optional generation
/// overrides. The file is streamed to disk; the size limit aborts the read.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let max_bytes = state.intake.limits().max_bytes;
    let mut file: Option<ReceivedFile> = None;
    let mut overrides = OptionOverrides::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(ApiError::bad_request("only one file per upload"));
                }
                file = Some(receive_file(field, max_bytes).await?);
            }
            "model" => overrides.model = text(field).await?,
            "prompt" | "prompt_text" => overrides.prompt_text = text(field).await?,
            "ratio" => overrides.ratio = text(field).await?,
            "seed" => overrides.seed = text(field).await?,
            "reference_image_uri" => overrides.reference_image_uri = text(field).await?,
            "public_figure_threshold" => overrides.public_figure_threshold = text(field).await?,
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    let file = file.ok_or(ValidationError::MissingFile)?;
    let job = state
        .intake
        .accept(UploadRequest {
            file: file.path,
            file_name: file.file_name,
            declared_type: file.declared_type,
            size_bytes: file.size_bytes,
            overrides,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            job_id: job.id,
            stage: job.stage,
        }),
    ))
}

async fn receive_file(field: Field<'_>, max_bytes: u64) -> Result<ReceivedFile, ApiError> {
    let file_name = field
        .file_name()
        .map(String::from)
        .ok_or(ValidationError::MissingFile)?;
    let declared_type = field.content_type().map(String::from);

    let path = NamedTempFile::new()
        .map_err(ApiError::internal)?
        .into_temp_path();
    let size_bytes = match stream_to_file(&path, field, Some(max_bytes)).await {
        Ok(written) => written,
        Err(StreamError::TooLarge { limit }) => {
            return Err(ValidationError::TooLarge {
                size: limit + 1,
                max: limit,
            }
            .into());
        }
        Err(StreamError::Io(e)) => {
            return Err(ApiError::bad_request(format!("upload interrupted: {}", e)));
        }
    };

    tracing::debug!(file_name = %file_name, size_bytes, "Received upload");
    Ok(ReceivedFile {
        path,
        file_name,
        declared_type,
        size_bytes,
    })
}

async fn text(field: Field<'_>) -> Result<Option<String>, ApiError> {
    let value = field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}
