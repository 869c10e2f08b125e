//! HTTP Server for the retention API.
//!
//! Provides REST endpoints for CSV upload and cohort analysis.
//! Heatmap rendering is handled by the client from the pivoted tables.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/analyze`    | Upload CSV for cohort analysis       |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//!
//! `/api/analyze` takes a multipart form with a `file` field and optional
//! `policy`, `customerColumn`, `dateColumn` and `dateFormat` text fields.
//! Request bodies are capped at [`MAX_UPLOAD_BYTES`] unless the server is
//! started with another limit; larger uploads get a 413.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, AnalysisResponse};
use crate::error::{CsvError, PipelineError, ServerError, ServerResult};
use crate::models::MissingValuePolicy;
use crate::transform::pipeline::{analyze_bytes, AnalysisOptions};

type ApiError = (StatusCode, Json<Value>);

/// Default upload limit. The Online Retail export is about 45 MB.
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Build the application router with the default upload limit.
pub fn router() -> Router {
    router_with_limit(MAX_UPLOAD_BYTES)
}

/// Build the application router accepting request bodies up to `max_upload_bytes`.
pub fn router_with_limit(max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze_csv))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    max_upload_bytes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Retention server running on http://localhost:{}", port);
    println!("   Upload limit: {} MB", max_upload_bytes / (1024 * 1024));
    println!("   POST /api/analyze - Upload CSV file");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router_with_limit(max_upload_bytes)).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "retention",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "analyze": "POST /api/analyze",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip the entries they missed.
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

/// Form fields of an analyze request.
struct AnalyzeForm {
    file_name: Option<String>,
    bytes: Vec<u8>,
    options: AnalysisOptions,
}

async fn read_form(mut multipart: Multipart) -> ServerResult<AnalyzeForm> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut options = AnalysisOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await.map_err(multipart_error)?;
            file_data = Some(bytes.to_vec());
            continue;
        }

        let text = field.text().await.map_err(multipart_error)?;
        let text = text.trim().to_string();
        if text.is_empty() {
            continue;
        }

        match name.as_str() {
            "policy" => {
                options.policy = text
                    .parse::<MissingValuePolicy>()
                    .map_err(ServerError::BadRequest)?;
            }
            "customerColumn" => options.customer_column = Some(text),
            "dateColumn" => options.date_column = Some(text),
            "dateFormat" => options.date_format = Some(text),
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;

    Ok(AnalyzeForm {
        file_name,
        bytes,
        options,
    })
}

/// Body limit hits surface as multipart errors; keep their 413.
fn multipart_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(err.body_text())
    } else {
        ServerError::BadRequest(format!("Multipart error: {}", err.body_text()))
    }
}

/// Analyze CSV endpoint
async fn analyze_csv(multipart: Multipart) -> Result<Json<AnalysisResponse>, ApiError> {
    let form = read_form(multipart).await.map_err(to_api_error)?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        form.file_name.as_deref().unwrap_or("unknown"),
        form.bytes.len()
    );
    println!("{}\n", "=".repeat(70));
    log_info(format!(
        "Analyzing {} with policy {}",
        form.file_name.as_deref().unwrap_or("upload"),
        form.options.policy.as_str()
    ));

    let AnalyzeForm { bytes, options, .. } = form;
    let result = tokio::task::spawn_blocking(move || analyze_bytes(&bytes, &options))
        .await
        .map_err(|e| to_api_error(ServerError::Internal(e.to_string())))?
        .map_err(|e| to_api_error(e.into()))?;

    let response = AnalysisResponse::from(result);

    println!("\n{}", "=".repeat(70));
    println!("📊 SUMMARY");
    println!("{}", "=".repeat(70));
    println!("   Customers:  {}", response.metadata.customer_count);
    println!("   Cohorts:    {}", response.metadata.cohort_count);
    println!("   Indices:    {}", response.cohorts.columns.len());
    println!("   Status:     {}", response.status);
    println!("{}\n", "=".repeat(70));

    Ok(Json(response))
}

/// HTTP status for an error.
///
/// Problems with the uploaded data are reported as 422 so the client can
/// show them to the user; I/O and task failures are 500.
fn status_of(err: &ServerError) -> StatusCode {
    match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Pipeline(PipelineError::Csv(CsvError::IoError(_))) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn to_api_error(err: ServerError) -> ApiError {
    log_error(err.to_string());
    (status_of(&err), Json(error_response(&err.to_string())))
}
