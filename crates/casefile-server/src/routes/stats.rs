//! Stats and health routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(get_health))
}

/// GET /api/stats — storage and analysis statistics.
async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.store().get_stats()?;
    let uploads = count_files_in_dir(&state.config.data_paths.uploads);
    let runtime = state.orchestrator.status();

    Ok(Json(serde_json::json!({
        "documents": stats.documents,
        "entities": stats.entities,
        "entitiesByType": stats.entities_by_type,
        "mentions": stats.mentions,
        "cooccurrences": stats.cooccurrences,
        "records": {
            "flights": stats.flights,
            "emails": stats.emails,
            "transactions": stats.transactions,
        },
        "timelineEvents": stats.timeline_events,
        "clusters": stats.clusters,
        "dbSizeMb": stats.db_size_mb,
        "uploads": uploads,
        "runtime": runtime,
    })))
}

/// GET /api/health
async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let documents = state.store().count_documents().ok();
    Json(serde_json::json!({
        "status": if documents.is_some() { "healthy" } else { "degraded" },
        "service": "casefile",
        "version": env!("CARGO_PKG_VERSION"),
        "documents": documents.unwrap_or(0),
    }))
}

fn count_files_in_dir(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}
