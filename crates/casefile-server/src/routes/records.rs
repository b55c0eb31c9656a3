//! Source-record intake — flights, emails, transactions. Records feed the
//! timeline on the next rebuild.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use casefile_store::{NewEmail, NewFlight, NewTransaction};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/records/flights", post(add_flights))
        .route("/records/emails", post(add_emails))
        .route("/records/transactions", post(add_transactions))
}

/// Accepts either a single record or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

fn created(ids: Vec<i64>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "added": ids.len(),
            "ids": ids,
        })),
    )
}

/// POST /api/records/flights
async fn add_flights(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneOrMany<NewFlight>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ids = body
        .into_vec()
        .iter()
        .map(|f| state.store().add_flight(f))
        .collect::<casefile_core::Result<Vec<_>>>()?;
    Ok(created(ids))
}

/// POST /api/records/emails
async fn add_emails(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneOrMany<NewEmail>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ids = body
        .into_vec()
        .iter()
        .map(|e| state.store().add_email(e))
        .collect::<casefile_core::Result<Vec<_>>>()?;
    Ok(created(ids))
}

/// POST /api/records/transactions
async fn add_transactions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OneOrMany<NewTransaction>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ids = body
        .into_vec()
        .iter()
        .map(|t| state.store().add_transaction(t))
        .collect::<casefile_core::Result<Vec<_>>>()?;
    Ok(created(ids))
}
