//! HTTP API for the key issuer.
//!
//! - `GET /licenses`: every issued key, oldest first
//! - `POST /generate`: `{"customerId": "...", "days": 30}` issues a new key

use crate::issuer::{IssuedKey, Issuer};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Day count as sent by the admin form, which may post numbers as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DaysInput {
    /// A JSON integer.
    Number(i64),
    /// A JSON number with a fractional part, such as `30.0`.
    Float(f64),
    /// A numeric string.
    Text(String),
}

impl DaysInput {
    fn value(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Float(f) => whole_days(*f),
            Self::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_days))
            }
        }
    }
}

fn whole_days(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15).then_some(f as i64)
}

/// Body of `POST /generate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Customer the key is issued to.
    pub customer_id: String,
    /// Days the key grants.
    pub days: DaysInput,
}

/// Successful reply to `POST /generate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Always true; failures use the `{"success": false, "error"}` body.
    pub success: bool,
    /// The issued key, flattened into the reply.
    #[serde(flatten)]
    pub record: IssuedKey,
}

fn failure(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "success": false, "error": message }))).into_response()
}

async fn list_handler(State(issuer): State<Arc<Issuer>>) -> Response {
    match issuer.list() {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!("Failed to read issuance log: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn generate_handler(
    State(issuer): State<Arc<Issuer>>,
    request: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Malformed key request: {rejection}");
            return failure(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    let Some(days) = request.days.value() else {
        return failure(StatusCode::BAD_REQUEST, "days must be a whole number".to_string());
    };
    match issuer.issue(&request.customer_id, days) {
        Ok(record) => Json(GenerateResponse {
            success: true,
            record,
        })
        .into_response(),
        Err(e) if e.is_invalid_request() => {
            warn!("Rejected key request: {e}");
            failure(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            warn!("Failed to issue key: {e}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Build the HTTP API router around an issuer.
pub fn build_router(issuer: Arc<Issuer>) -> Router {
    Router::new()
        .route("/licenses", get(list_handler))
        .route("/generate", post(generate_handler))
        .with_state(issuer)
}
