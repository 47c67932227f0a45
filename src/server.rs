//! HTTP surface: routes, multipart extraction and error shaping.
//!
//! | Method | Path         | Body                     | Response            |
//! |--------|--------------|--------------------------|---------------------|
//! | GET    | `/`          |                          | liveness message    |
//! | POST   | `/ocr/image` | multipart field `file`   | one `PageResult`    |
//! | POST   | `/ocr/pdf`   | multipart field `file`   | `[PageResult, ...]` |
//!
//! Errors are `{"detail": "..."}`. Caller mistakes are 400 with the reason as
//! the detail; everything else is 500 with the detail prefixed `OCR failed: `.

use crate::config::ServiceConfig;
use crate::convert::OcrService;
use crate::error::OcrError;
use crate::output::PageResult;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OcrService>,
}

impl AppState {
    pub fn new(service: OcrService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: &'static str,
}

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<OcrError> for ApiError {
    fn from(err: OcrError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = if status.is_client_error() {
            err.to_string()
        } else {
            tracing::error!(error = %err, "OCR request failed");
            format!("OCR failed: {}", err)
        };
        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}

/// The uploaded file: declared content type plus raw bytes.
#[derive(Debug)]
pub struct Upload {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Pull the `file` field out of a multipart body. Other fields are skipped.
pub async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => {
                tracing::warn!("Upload without a '{}' field", FILE_FIELD);
                return Err(ApiError::bad_request(format!(
                    "Missing multipart field '{}'",
                    FILE_FIELD
                )));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read multipart");
                return Err(ApiError {
                    status: e.status(),
                    detail: format!("Failed to read multipart: {}", e.body_text()),
                });
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let filename = field.file_name().unwrap_or("unknown").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to read file bytes");
            ApiError {
                status: e.status(),
                detail: format!("Failed to read file: {}", e.body_text()),
            }
        })?;
        tracing::debug!(
            filename = %filename,
            content_type = ?content_type,
            bytes = bytes.len(),
            "File received"
        );
        return Ok(Upload {
            content_type,
            bytes: bytes.to_vec(),
        });
    }
}

pub async fn root_handler() -> Json<StatusMessage> {
    Json(StatusMessage {
        message: "OCR service is running",
    })
}

#[tracing::instrument(skip(state, multipart))]
pub async fn ocr_image_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PageResult>, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    let result = state
        .service
        .ocr_image(upload.content_type.as_deref(), upload.bytes)
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state, multipart))]
pub async fn ocr_pdf_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<PageResult>>, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    let results = state
        .service
        .ocr_pdf(upload.content_type.as_deref(), upload.bytes)
        .await?;
    Ok(Json(results))
}

pub fn create_router(state: AppState) -> Router {
    let limit = state.service.config().max_upload_bytes;
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/", get(root_handler))
        .route("/ocr/image", post(ocr_image_handler))
        .route("/ocr/pdf", post(ocr_pdf_handler))
        .layer(DefaultBodyLimit::max(limit))
        .layer(trace_layer)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &ServiceConfig, service: OcrService) -> std::io::Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    info!("OCR service listening on {}", listener.local_addr()?);

    let router = create_router(AppState::new(service));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("OCR service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C; shutting down");
    }
    info!("Shutdown signal received");
}
