//! HTTP route handlers, all mounted under `/api`.

pub mod analysis;
pub mod documents;
pub mod entities;
pub mod rebuild;
pub mod records;
pub mod stats;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(stats::routes())
        .merge(documents::routes())
        .merge(entities::routes())
        .merge(analysis::routes())
        .merge(records::routes())
        .merge(rebuild::routes())
}

/// Parse an optional `YYYY-MM-DD` query parameter.
pub(crate) fn parse_date_param(
    name: &str,
    raw: Option<&str>,
) -> crate::error::ApiResult<Option<chrono::NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => chrono::NaiveDate::parse_from_str(s, casefile_store::DATE_FORMAT)
            .map(Some)
            .map_err(|_| {
                crate::error::ApiError::bad_request(format!("{} must be YYYY-MM-DD, got {:?}", name, s))
            }),
    }
}
