use super::error::ApiError;
use super::state::AppState;
use crate::application::status::JobStatusView;
use crate::domain::jobs::JobId;
use axum::extract::{Path, State};
use axum::Json;

pub(super) fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("'{}' is not a job id", raw)))
}

/// `GET /jobs/:id`
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let id = parse_job_id(&id)?;
    Ok(Json(state.status.status(id).await?))
}

/// `POST /jobs/:id/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    let id = parse_job_id(&id)?;
    let job = state.cancellation.cancel(id).await?;
    Ok(Json(JobStatusView::from(&job)))
}
