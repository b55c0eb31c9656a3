//! Derived-table query routes — co-occurrences, network, timeline, clusters.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use casefile_analyze::NetworkQuery;
use casefile_store::{ClusterFilter, CoOccurrenceFilter, EventType, Severity, TimelineFilter};

use super::parse_date_param;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cooccurrences", get(list_cooccurrences))
        .route("/network", get(get_network))
        .route("/timeline", get(list_timeline))
        .route("/clusters", get(list_clusters))
}

#[derive(Deserialize)]
struct CoOccurrenceQuery {
    min_count: Option<i64>,
    entity: Option<String>,
    limit: Option<usize>,
}

/// GET /api/cooccurrences?min_count&entity&limit
async fn list_cooccurrences(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CoOccurrenceQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = CoOccurrenceFilter {
        min_count: params.min_count,
        entity_name: params.entity.filter(|s| !s.trim().is_empty()),
        limit: Some(params.limit.unwrap_or(100)),
    };
    let pairs = state.store().list_cooccurrences(&filter)?;
    Ok(Json(serde_json::json!({
        "cooccurrences": pairs,
        "total": pairs.len(),
    })))
}

#[derive(Deserialize)]
struct NetworkParams {
    #[serde(rename = "type")]
    entity_type: Option<String>,
    limit: Option<usize>,
    min_weight: Option<i64>,
}

/// GET /api/network?type&limit&min_weight — top-N nodes and the edges
/// among them. Unset parameters fall back to the analysis config.
async fn get_network(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NetworkParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut query = state.orchestrator.default_network_query();
    if let Some(t) = params.entity_type.as_deref() {
        query.entity_type = NetworkQuery::parse_type(t);
    }
    if let Some(limit) = params.limit {
        query.limit = limit.min(1000);
    }
    if let Some(min_weight) = params.min_weight {
        query.min_weight = min_weight;
    }

    let network = state.orchestrator.network(&query)?;
    Ok(Json(serde_json::json!(network)))
}

#[derive(Deserialize)]
struct TimelineParams {
    from: Option<String>,
    to: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    entity: Option<String>,
    suspicious: Option<bool>,
    limit: Option<usize>,
}

/// GET /api/timeline?from&to&type&entity&suspicious&limit
async fn list_timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let event_type = match params.event_type.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            EventType::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown event type {:?}", raw)))?,
        ),
    };
    let filter = TimelineFilter {
        from: parse_date_param("from", params.from.as_deref())?,
        to: parse_date_param("to", params.to.as_deref())?,
        event_type,
        entity_name: params.entity.filter(|s| !s.trim().is_empty()),
        suspicious_only: params.suspicious.unwrap_or(false),
        limit: params.limit,
    };

    let events = state.store().list_timeline_events(&filter)?;
    Ok(Json(serde_json::json!({
        "events": events,
        "total": events.len(),
    })))
}

#[derive(Deserialize)]
struct ClusterParams {
    severity: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

/// GET /api/clusters?severity&from&to — clusters overlapping the range.
async fn list_clusters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClusterParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let severity = match params.severity.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            Severity::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("unknown severity {:?}", raw)))?,
        ),
    };
    let filter = ClusterFilter {
        severity,
        from: parse_date_param("from", params.from.as_deref())?,
        to: parse_date_param("to", params.to.as_deref())?,
    };

    let clusters = state.store().list_clusters(&filter)?;
    Ok(Json(serde_json::json!({
        "clusters": clusters,
        "total": clusters.len(),
    })))
}
