use std::net::SocketAddr;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vidvary_core::{ServiceError, UploadError, VariationService};

use crate::AppError;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>Video Variation Tool</title></head>
  <body>
    <h1>Video Variation Tool</h1>
    <p>Upload a video to create 3 variations with different presets.</p>
    <form action="/variations" method="post" enctype="multipart/form-data">
      <input type="file" name="file" accept=".mp4,.avi,.mov" required>
      <button type="submit">Download Video Variations</button>
    </form>
  </body>
</html>
"#;

pub fn router(service: VariationService) -> Router {
    let limit = usize::try_from(service.policy().max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/", get(upload_form))
        .route("/health", get(health))
        .route("/variations", post(create_variations))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn serve(addr: SocketAddr, service: VariationService) -> crate::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(AppError::Server)?;
    info!(%addr, "upload form listening");
    axum::serve(listener, router(service))
        .await
        .map_err(AppError::Server)
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn health() -> &'static str {
    "ok"
}

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(error_body(err.status(), vec![err.body_text()])),
        };
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| error_body(err.status(), vec![err.body_text()]))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(error_body(
        StatusCode::BAD_REQUEST,
        vec!["multipart field `file` is required".to_string()],
    ))
}

async fn create_variations(
    State(service): State<VariationService>,
    mut multipart: Multipart,
) -> Response {
    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    match service.process_upload(&upload.file_name, &upload.bytes).await {
        Ok(download) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, download.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", download.file_name),
                ),
            ],
            download.bytes,
        )
            .into_response(),
        Err(err) => {
            warn!(file_name = %upload.file_name, error = %err, "variation request failed");
            error_body(status_for(&err), err.user_messages())
        }
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        ServiceError::Upload(_) => StatusCode::BAD_REQUEST,
        ServiceError::Batch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Workspace { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(status: StatusCode, messages: Vec<String>) -> Response {
    (status, Json(json!({ "errors": messages }))).into_response()
}
