use crate::domain::{IngestJob, StorageStats, StoredRecord};
use crate::pipeline::ingest::ingest_reader;
use crate::pipeline::rules::RuleSet;
use crate::pipeline::ValidationError;
use crate::storage::Storage;
use axum::{
    extract::{Multipart, Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 50;
const DEFAULT_JOB_LIMIT: u64 = 50;

/// Shared handler state: storage plus the rule set compiled once at startup.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub rules: Arc<RuleSet>,
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub valid_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<StoredRecord>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub job_id: Option<Uuid>,
    pub filename: String,
    pub rows_processed: u64,
    pub valid_rows: u64,
    pub invalid_rows: u64,
    pub errors: Vec<ValidationError>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "dataforge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "detail": message }))).into_response()
}

async fn list_records(
    Extension(state): Extension<AppState>,
    Query(params): Query<ListRecordsParams>,
) -> impl IntoResponse {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let valid_only = params.valid_only.unwrap_or(false);

    match state.storage.list_records(page, page_size, valid_only).await {
        Ok((records, total)) => Json(RecordListResponse {
            records,
            total,
            page,
            page_size,
        })
        .into_response(),
        Err(e) => {
            error!("Failed to list records: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_record(
    Extension(state): Extension<AppState>,
    Path(record_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.storage.get_record(record_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Record not found".to_string()),
        Err(e) => {
            error!("Failed to fetch record {}: {}", record_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_record(
    Extension(state): Extension<AppState>,
    Path(record_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.storage.delete_record(record_id).await {
        Ok(true) => Json(serde_json::json!({
            "message": format!("Record {record_id} deleted")
        }))
        .into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Record not found".to_string()),
        Err(e) => {
            error!("Failed to delete record {}: {}", record_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Upload and process a CSV file. Invalid rows do not abort the upload; the
/// response reports errors per failing row alongside the accepted count.
async fn upload_file(
    Extension(state): Extension<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut file_part: Option<(String, Vec<u8>)> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    let filename = field.file_name().unwrap_or("upload.csv").to_string();
                    match field.bytes().await {
                        Ok(bytes) => {
                            file_part = Some((filename, bytes.to_vec()));
                            break;
                        }
                        Err(e) => {
                            return error_response(
                                StatusCode::BAD_REQUEST,
                                format!("Failed to read upload: {e}"),
                            )
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid multipart request: {e}"),
                )
            }
        }
    }

    let Some((filename, bytes)) = file_part else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing 'file' field in upload".to_string(),
        );
    };

    if !filename.to_lowercase().ends_with(".csv") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Only CSV files are supported".to_string(),
        );
    }

    info!("Processing upload of {} ({} bytes)", filename, bytes.len());

    match ingest_reader(&bytes[..], &filename, &state.rules, state.storage.clone()).await {
        Ok(report) => Json(UploadResponse {
            message: "File processed successfully".to_string(),
            job_id: report.job_id,
            filename: report.filename,
            rows_processed: report.total_rows,
            valid_rows: report.valid_rows,
            invalid_rows: report.invalid_rows,
            errors: report.errors,
        })
        .into_response(),
        Err(e) => {
            error!("Upload of {} failed: {}", filename, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_stats(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match state.storage.stats().await {
        Ok(stats) => Json::<StorageStats>(stats).into_response(),
        Err(e) => {
            error!("Failed to compute stats: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_jobs(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match state.storage.list_jobs(DEFAULT_JOB_LIMIT).await {
        Ok(jobs) => Json::<Vec<IngestJob>>(jobs).into_response(),
        Err(e) => {
            error!("Failed to list jobs: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_job(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.storage.get_job(job_id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Job not found".to_string()),
        Err(e) => {
            error!("Failed to fetch job {}: {}", job_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Create the HTTP server with all routes
pub fn create_server(storage: Arc<dyn Storage>, rules: Arc<RuleSet>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let state = AppState { storage, rules };

    Router::new()
        .route("/health", get(health))
        .route("/api/records", get(list_records))
        .route("/api/records/:id", get(get_record).delete(delete_record))
        .route("/api/upload", post(upload_file))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/stats", get(get_stats))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified host and port
pub async fn start_server(
    storage: Arc<dyn Storage>,
    rules: Arc<RuleSet>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(storage, rules);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    println!("🚀 HTTP server running on http://{addr}");
    println!("💚 Health check: http://{addr}/health");
    println!("📤 Upload:       POST http://{addr}/api/upload");
    println!("📄 Records:      http://{addr}/api/records");

    hyper::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
