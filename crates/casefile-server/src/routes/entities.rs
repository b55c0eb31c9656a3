//! Entity routes — listing, detail, connections, merge, consolidation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use casefile_store::EntityType;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/entities", get(list_entities))
        .route("/entities/merge", post(merge_entities))
        .route("/entities/consolidate", post(consolidate))
        .route("/entities/{id}", get(get_entity))
        .route("/entities/{id}/connections", get(get_connections))
}

#[derive(Deserialize)]
struct ListEntitiesQuery {
    #[serde(rename = "type")]
    entity_type: Option<String>,
    limit: Option<usize>,
}

/// GET /api/entities?type&limit — most-mentioned first.
async fn list_entities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListEntitiesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let entity_type = params
        .entity_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(EntityType::parse);
    let limit = params.limit.unwrap_or(100).min(1000);

    let entities = state.store().list_entities(entity_type.as_ref(), limit)?;
    Ok(Json(serde_json::json!({
        "entities": entities,
        "total": entities.len(),
    })))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

/// GET /api/entities/{id} — the entity and a sample of its mentions.
async fn get_entity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let entity = state
        .store()
        .get_entity(id)?
        .ok_or_else(|| ApiError::not_found(format!("entity {}", id)))?;
    let mentions = state
        .store()
        .mentions_for_entity(id, params.limit.unwrap_or(50).min(500))?;
    Ok(Json(serde_json::json!({
        "entity": entity,
        "mentions": mentions,
    })))
}

/// GET /api/entities/{id}/connections?limit — co-occurrence partners.
async fn get_connections(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let connections = state
        .orchestrator
        .connections(id, params.limit.unwrap_or(25).min(500))?;
    Ok(Json(serde_json::json!({
        "entityId": id,
        "connections": connections,
        "total": connections.len(),
    })))
}

#[derive(Deserialize)]
struct MergeRequest {
    survivor_id: i64,
    duplicate_id: i64,
}

/// POST /api/entities/merge — fold one entity into another, then rebuild
/// co-occurrences.
async fn merge_entities(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let orchestrator = state.orchestrator.clone();
    let report = tokio::task::spawn_blocking(move || {
        orchestrator.merge_entities(req.survivor_id, req.duplicate_id)
    })
    .await??;
    Ok(Json(serde_json::json!(report)))
}

/// POST /api/entities/consolidate — canonical-name dedup pass.
async fn consolidate(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::task::spawn_blocking(move || orchestrator.consolidate()).await??;
    Ok(Json(serde_json::json!(outcome)))
}
