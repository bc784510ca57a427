//! HTTP Server for the orderload API.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/transform`  | Upload an export for transformation  |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//!
//! `/api/transform` takes a multipart form: `file` (required), and optional
//! `schema` (JSON), `plan` (JSON) and `header_row` (integer).

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{error_response, TransformResponse};
use crate::error::ServerError;
use crate::models::TargetSchema;
use crate::transform::pipeline::{transform_bytes, TransformOptions};
use crate::transform::plan::PlanDocument;

type ApiError = (StatusCode, Json<Value>);

/// Options every request starts from.
#[derive(Clone)]
struct AppState {
    defaults: Arc<TransformOptions>,
}

/// Build the router. Requests start from `defaults` and override the
/// schema, plan and header row from their form fields.
pub fn router(defaults: TransformOptions) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/transform", post(transform_upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(AppState {
            defaults: Arc::new(defaults),
        })
}

/// Start the HTTP server
pub async fn start_server(port: u16, defaults: TransformOptions) -> Result<(), ServerError> {
    let app = router(defaults);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("cannot bind {}: {}", addr, e)))?;

    log_success(format!("Orderload server running on http://localhost:{}", port));
    log_info("POST /api/transform - Upload an order export");
    log_info("GET  /api/logs      - SSE log stream");
    log_info("GET  /health        - Health check");

    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "orderload",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "transform": "POST /api/transform",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn bad_request(error: ServerError) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(error_response(&error.to_string())))
}

/// Form fields of a transform request
#[derive(Default)]
struct TransformForm {
    file_name: Option<String>,
    file: Option<Vec<u8>>,
    schema: Option<TargetSchema>,
    plan: Option<PlanDocument>,
    header_row: Option<usize>,
}

async fn read_form(mut multipart: Multipart) -> Result<TransformForm, ServerError> {
    let mut form = TransformForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            form.file_name = field.file_name().map(|s| s.to_string());
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error on '{}': {}", name, e)))?;

        match name.as_str() {
            "file" => form.file = Some(bytes.to_vec()),
            "schema" => {
                let text = String::from_utf8_lossy(&bytes);
                let schema = TargetSchema::from_json(&text)
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
                form.schema = Some(schema);
            }
            "plan" => {
                let text = String::from_utf8_lossy(&bytes);
                let plan = PlanDocument::from_json(&text)
                    .map_err(|e| ServerError::BadRequest(e.to_string()))?;
                form.plan = Some(plan);
            }
            "header_row" => {
                let text = String::from_utf8_lossy(&bytes);
                let row = text.trim().parse::<usize>().map_err(|_| {
                    ServerError::BadRequest(format!("header_row is not a row index: {}", text))
                })?;
                form.header_row = Some(row);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn transform_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TransformResponse>, ApiError> {
    let form = read_form(multipart).await.map_err(bad_request)?;
    let bytes = form
        .file
        .ok_or_else(|| bad_request(ServerError::BadRequest("No file provided".into())))?;

    log_info(format!(
        "New upload: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let mut options = (*state.defaults).clone();
    if form.schema.is_some() {
        options.schema = form.schema;
    }
    if form.plan.is_some() {
        options.plan = form.plan;
    }
    if form.header_row.is_some() {
        options.header_row = form.header_row;
    }

    let result = transform_bytes(&bytes, options).await.map_err(|e| {
        let error = ServerError::from(e);
        log_error(format!("Transform error: {}", error));
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(error_response(&error.to_string())),
        )
    })?;

    let response = TransformResponse::from_result(result).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&ServerError::Internal(e).to_string())),
        )
    })?;

    Ok(Json(response))
}
