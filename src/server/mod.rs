use crate::config::Config;
use crate::error::PipelineError;
use crate::media::{platform, FetcherRegistry, Platform};
use crate::pipeline::{Pipeline, ResultRecord, ScratchDir, VIDEO_CONTENT_TYPE};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub struct AppState {
    pub fetchers: FetcherRegistry,
    /// Absent when storage is not configured; `/process` is then unavailable.
    pub pipeline: Option<Arc<Pipeline>>,
    /// Root under which each download gets its own directory.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct VideoUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/download/youtube", post(download_youtube))
        .route("/download/instagram", post(download_instagram))
        .route("/process", post(process))
        .with_state(state)
}

pub async fn run(config: &Config, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("HTTP service listening on {}", config.server.bind);

    axum::serve(listener, router(state))
        .await
        .context("HTTP service stopped")
}

async fn health() -> &'static str {
    "ok"
}

async fn download_youtube(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VideoUrl>,
) -> Response {
    download_single(&state, Platform::Youtube, &body.url).await
}

async fn download_instagram(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VideoUrl>,
) -> Response {
    download_single(&state, Platform::Instagram, &body.url).await
}

/// One fetch, no retry, no upload: the file goes straight back to the caller.
async fn download_single(state: &AppState, expected: Platform, url: &str) -> Response {
    match platform::classify(url) {
        Ok(found) if found == expected => {}
        Ok(_) | Err(_) => {
            let err = PipelineError::UnsupportedPlatform(url.to_string());
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    }

    let Some(fetcher) = state.fetchers.get(expected) else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("No fetcher configured for {}", expected),
        );
    };

    let scratch = match ScratchDir::create(&state.scratch_dir).await {
        Ok(scratch) => scratch,
        Err(e) => {
            error!("Failed to create scratch directory: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Scratch space unavailable");
        }
    };

    let metadata = match fetcher.fetch(url, scratch.path()).await {
        Ok(metadata) => metadata,
        Err(e) => {
            error!("Failed to download {}: {:#}", url, e);
            let status = match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::NotAVideo(_)) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            };
            return error_response(status, format!("{e:#}"));
        }
    };

    let Some(path) = metadata.local_path else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Video not found");
    };

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Video not found");
        }
    };
    scratch.release();

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    (
        [
            (header::CONTENT_TYPE, VIDEO_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response()
}

async fn process(State(state): State<Arc<AppState>>, Json(body): Json<BatchRequest>) -> Response {
    let Some(pipeline) = state.pipeline.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Storage is not configured");
    };

    let records: Vec<ResultRecord> = pipeline.process_batch(&body.urls).await;
    Json(records).into_response()
}
