//! Rebuild routes. Rebuilds run on the blocking pool; a rebuild requested
//! while another holds the guard returns 409.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use casefile_runtime::RebuildTarget;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rebuild/status", get(get_status))
        .route("/rebuild/{target}", post(rebuild))
}

/// POST /api/rebuild/{target} — target ∈ cooccurrences, timeline, clusters, all.
async fn rebuild(
    State(state): State<Arc<AppState>>,
    Path(target): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = RebuildTarget::parse(&target).ok_or_else(|| {
        ApiError::bad_request(format!(
            "unknown rebuild target {:?}; expected cooccurrences, timeline, clusters or all",
            target
        ))
    })?;
    let orchestrator = state.orchestrator.clone();
    let report = tokio::task::spawn_blocking(move || orchestrator.rebuild(target)).await??;
    Ok(Json(serde_json::json!(report)))
}

/// GET /api/rebuild/status — what currently holds the rebuild guard.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.orchestrator.status()))
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{call, low_threshold, test_app};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_rebuild_targets() {
        let (app, state, _dir) = test_app(low_threshold());
        state.orchestrator.ingest_text("a.txt", "x Alice Smith met Bob Jones").unwrap();
        state.orchestrator.ingest_text("b.txt", "y Alice Smith met Bob Jones").unwrap();

        let (status, json) = call(&app, Method::POST, "/api/rebuild/cooccurrences", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["target"], "cooccurrences");
        assert_eq!(json["cooccurrence"]["pairs_kept"], 1);
        assert!(json.get("timeline").is_none());

        let (status, json) = call(&app, Method::POST, "/api/rebuild/all", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["cooccurrence"].is_object());
        assert_eq!(json["timeline"]["events"], 0);

        let (status, json) = call(&app, Method::POST, "/api/rebuild/clusters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["clusters"]["clusters_emitted"], 0);
    }

    #[tokio::test]
    async fn test_rebuild_bad_target() {
        let (app, _state, _dir) = test_app(low_threshold());
        let (status, json) = call(&app, Method::POST, "/api/rebuild/everything", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("everything"));
    }

    #[tokio::test]
    async fn test_rebuild_conflict_and_status() {
        let (app, state, _dir) = test_app(low_threshold());
        let guard = state.orchestrator.guard("rebuild timeline").unwrap();

        let (_, json) = call(&app, Method::GET, "/api/rebuild/status", None).await;
        assert_eq!(json["active"], "rebuild timeline");

        let (status, _) = call(&app, Method::POST, "/api/rebuild/all", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        drop(guard);
        let (status, _) = call(&app, Method::POST, "/api/rebuild/all", None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
