//! Local storage served over HTTP for the monolith.
//!
//! Only published artifacts and sources of in-flight jobs are reachable.
//! Staged sources disappear once their job is finished, and in-progress
//! writes (dot-prefixed files) are never served.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::path::Path;
use tower_http::services::ServeDir;

pub fn files_router(root: &Path) -> Router {
    Router::new()
        .nest_service("/files/artifacts", ServeDir::new(root.join("artifacts")))
        // Classifier and generation service fetch sources from here
        .nest_service("/files/staging", ServeDir::new(root.join("staging")))
        .layer(middleware::from_fn(hide_hidden_files))
}

async fn hide_hidden_files(request: Request, next: Next) -> Response {
    if is_hidden(request.uri().path()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| {
        segment.starts_with('.') || segment.to_ascii_lowercase().starts_with("%2e")
    })
}
