//! Document routes — add, list, fetch, backfill, delete, upload, search.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", post(add_document).get(list_documents))
        .route("/documents/upload", post(upload_documents))
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/documents/{id}/content", put(replace_content))
        .route("/search", get(search))
}

#[derive(Deserialize)]
struct AddDocumentRequest {
    filename: String,
    content: String,
}

/// POST /api/documents — store text and extract its mentions.
async fn add_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddDocumentRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is empty"));
    }
    let outcome = state.orchestrator.ingest_text(&req.filename, &req.content)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(outcome))))
}

#[derive(Deserialize)]
struct ListDocumentsQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

/// GET /api/documents?page&page_size
async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).clamp(1, 200);

    let (docs, total) = state.store().get_documents_paginated(page, page_size)?;
    Ok(Json(serde_json::json!({
        "documents": docs,
        "total": total,
        "page": page,
        "pageSize": page_size,
        "totalPages": (total as f64 / page_size as f64).ceil() as i64,
    })))
}

/// GET /api/documents/{id} — the document and its mentions.
async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let doc = state
        .store()
        .get_document(id)?
        .ok_or_else(|| ApiError::not_found(format!("document {}", id)))?;
    let mentions = state.store().mentions_for_document(id)?;
    Ok(Json(serde_json::json!({
        "document": doc,
        "mentions": mentions,
    })))
}

#[derive(Deserialize)]
struct ReplaceContentRequest {
    content: String,
}

/// PUT /api/documents/{id}/content — backfill text (e.g. OCR output) and
/// re-extract mentions.
async fn replace_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ReplaceContentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is empty"));
    }
    let orchestrator = state.orchestrator.clone();
    let report =
        tokio::task::spawn_blocking(move || orchestrator.replace_content(id, &req.content))
            .await??;
    Ok(Json(serde_json::json!(report)))
}

/// DELETE /api/documents/{id} — remove the document and its mentions, then
/// rebuild co-occurrence.
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let orchestrator = state.orchestrator.clone();
    let report = tokio::task::spawn_blocking(move || orchestrator.delete_document(id)).await??;
    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": id,
        "cooccurrence": report.cooccurrence,
    })))
}

/// POST /api/documents/upload — multipart upload; each file is saved to the
/// uploads directory and ingested.
async fn upload_documents(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Json<serde_json::Value> {
    let mut ingested = Vec::new();
    let mut skipped = Vec::new();
    let mut errors = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let filename = match field.file_name() {
            Some(name) => sanitize_filename(name),
            None => continue,
        };

        let bytes = match field.bytes().await {
            Ok(b) => b,
            Err(e) => {
                errors.push(serde_json::json!({
                    "filename": filename,
                    "error": format!("Read failed: {}", e),
                }));
                continue;
            }
        };

        let path = unique_upload_path(&state.config.data_paths.uploads, &filename);
        if let Err(e) = std::fs::write(&path, &bytes) {
            errors.push(serde_json::json!({
                "filename": filename,
                "error": format!("Write failed: {}", e),
            }));
            continue;
        }

        let orchestrator = state.orchestrator.clone();
        let ingest_path = path.clone();
        let result = tokio::task::spawn_blocking(move || orchestrator.ingest_file(&ingest_path))
            .await
            .map_err(|e| casefile_core::Error::Internal(format!("ingest task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(Some(outcome)) => ingested.push(serde_json::json!(outcome)),
            Ok(None) => skipped.push(serde_json::json!({
                "filename": filename,
                "reason": "no readable text",
            })),
            Err(casefile_core::Error::DuplicateContent(hash)) => {
                discard_upload(&path);
                skipped.push(serde_json::json!({
                    "filename": filename,
                    "reason": "duplicate content",
                    "contentHash": hash,
                }));
            }
            Err(e) => {
                warn!("Upload ingest failed for {}: {}", filename, e);
                errors.push(serde_json::json!({
                    "filename": filename,
                    "error": e.to_string(),
                }));
            }
        }
    }

    Json(serde_json::json!({
        "ingested": ingested.len(),
        "skipped": skipped.len(),
        "errors": errors.len(),
        "files": ingested,
        "skippedDetails": skipped,
        "errorDetails": errors,
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

/// GET /api/search?q&limit — BM25 full-text search.
async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 200);
    let results = state.store().search_documents(&params.q, limit)?;
    Ok(Json(serde_json::json!({
        "query": params.q,
        "total": results.len(),
        "results": results,
    })))
}

fn sanitize_filename(name: &str) -> String {
    let name = name.replace(['/', '\\'], "").replace("..", "");
    std::path::Path::new(&name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("unnamed")
        .to_string()
}

/// Remove a saved upload whose content is already stored.
fn discard_upload(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove duplicate upload {}: {}", path.display(), e);
    }
}

/// Pick a path in `dir` that does not exist yet, adding a timestamp suffix on
/// collision.
fn unique_upload_path(dir: &std::path::Path, filename: &str) -> std::path::PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let path = std::path::Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let ts = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
    if ext.is_empty() {
        dir.join(format!("{}_{}", stem, ts))
    } else {
        dir.join(format!("{}_{}.{}", stem, ts, ext))
    }
}
